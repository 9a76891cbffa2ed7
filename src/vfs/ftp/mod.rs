//! FTP backend.
//!
//! Each [`FtpConnection`] owns one control session and has its own identity,
//! so paths of two FTP connections never mix. Files are opened through a
//! local proxy copy: downloaded with `RETR` on open and uploaded with `STOR`
//! when a modified proxy is flushed or closed.

mod client;

use std::fmt;
use std::fs::File;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use client::{FtpSession, is_refusal};

use crate::Path;
use crate::core::utils::{self, GlobPattern};
use crate::core::{
    BackendKind, ConnectionId, CwdStack, FileHandle, FsBackend, FsConnector, FsError, OpenMode,
    Result,
};
use crate::vfs::proxy::{ProxyFile, Writeback};
use crate::vfs::temp::temp_file_path;

pub const DEFAULT_PORT: u16 = 21;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// User name and password for a server login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub password: String,
}

impl Credential {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// The conventional anonymous login.
    pub fn anonymous() -> Self {
        Self::new("anonymous", "anonymous@")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("password", &"****")
            .finish()
    }
}

/// Describes an FTP server and how to log into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpConnector {
    server: String,
    port: u16,
    credential: Credential,
    passive: bool,
    timeout: Duration,
    initial_cwd: Option<String>,
}

impl FtpConnector {
    pub fn new(server: impl Into<String>, credential: Credential) -> Self {
        Self {
            server: server.into(),
            port: DEFAULT_PORT,
            credential,
            passive: true,
            timeout: DEFAULT_TIMEOUT,
            initial_cwd: None,
        }
    }

    /// Builds a connector from `host` or `host:port`.
    pub fn from_address(address: &str, credential: Credential) -> Result<Self> {
        let (server, port) = utils::split_port(address, DEFAULT_PORT)?;
        Ok(Self::new(server, credential).port(port))
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Passive mode (`PASV`, the default) or active mode (`PORT`).
    pub fn passive(mut self, passive: bool) -> Self {
        self.passive = passive;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn initial_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.initial_cwd = Some(cwd.into());
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn server_port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.credential.user
    }
}

impl FsConnector for FtpConnector {
    type Connection = FtpConnection;

    fn initial_cwd(&self) -> Option<&str> {
        self.initial_cwd.as_deref()
    }

    fn new_connection(&self) -> Result<FtpConnection> {
        Ok(FtpConnection::new(self.clone()))
    }
}

type SharedSession = Arc<Mutex<Option<FtpSession>>>;

fn lock(session: &Mutex<Option<FtpSession>>) -> MutexGuard<'_, Option<FtpSession>> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `op` with the server working directory set to `dir`, then changes
/// back. An empty `dir` means the current one.
fn in_dir<T>(
    session: &mut FtpSession,
    dir: &str,
    op: impl FnOnce(&mut FtpSession) -> Result<T>,
) -> Result<T> {
    if dir.is_empty() {
        return op(session);
    }
    let previous = session.pwd()?;
    session.cwd(dir)?;
    let result = op(session);
    let restored = session.cwd(&previous);
    let value = result?;
    restored?;
    Ok(value)
}

/// `Ok(true)` when `result` succeeded, `Ok(false)` when the server refused.
fn answered<T>(result: Result<T>) -> Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(err) if is_refusal(&err) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Splits a location into the directory to change into and the bare name.
fn split_location(location: &str) -> (String, String) {
    (
        utils::dir_name(location).to_string(),
        utils::base_name(location).to_string(),
    )
}

/// A connection to one FTP server.
///
/// Starts closed: call [`FsBackend::open`] (or wrap it in an
/// [`OpenConnection`](crate::OpenConnection)) before use.
pub struct FtpConnection {
    id: ConnectionId,
    connector: FtpConnector,
    session: SharedSession,
    cwd: CwdStack,
}

impl FtpConnection {
    pub fn new(connector: FtpConnector) -> Self {
        Self {
            id: ConnectionId::unique(BackendKind::Ftp),
            connector,
            session: Arc::new(Mutex::new(None)),
            cwd: CwdStack::default(),
        }
    }

    pub fn connector(&self) -> &FtpConnector {
        &self.connector
    }

    fn with_session<T>(&self, op: impl FnOnce(&mut FtpSession) -> Result<T>) -> Result<T> {
        let mut guard = lock(&self.session);
        let session = guard.as_mut().ok_or(FsError::ConnectionNotOpen)?;
        op(session)
    }

    /// Runs `op` in the parent directory of `path`, passing the bare name.
    fn in_parent<T>(
        &self,
        path: &Path,
        op: impl FnOnce(&mut FtpSession, &str) -> Result<T>,
    ) -> Result<T> {
        let (dir, name) = split_location(&self.check_path(path)?);
        self.with_session(|session| in_dir(session, &dir, |session| op(session, &name)))
    }

    fn download(&self, path: &Path, target: &std::path::Path) -> Result<()> {
        let mut staged = File::create(target)?;
        let bytes = self.in_parent(path, |session, name| session.retrieve(name, &mut staged))?;
        debug!(location = %path, bytes, "downloaded");
        Ok(())
    }

    fn upload_on_flush(&self, path: &Path) -> Result<Writeback> {
        let (dir, name) = split_location(&self.check_path(path)?);
        let session = Arc::clone(&self.session);
        Ok(Box::new(move |local: &std::path::Path| -> Result<()> {
            let mut source = File::open(local)?;
            let mut guard = lock(&session);
            let session = guard.as_mut().ok_or(FsError::ConnectionNotOpen)?;
            let bytes = in_dir(session, &dir, |session| session.store(&name, &mut source))?;
            debug!(dir = %dir, name = %name, bytes, "uploaded");
            Ok(())
        }))
    }
}

impl fmt::Debug for FtpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpConnection")
            .field("id", &self.id)
            .field("server", &self.connector.server)
            .field("port", &self.connector.port)
            .field("open", &lock(&self.session).is_some())
            .finish()
    }
}

impl FsBackend for FtpConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    /// Probes the session with `NOOP`; a dead session is dropped.
    fn is_open(&self) -> bool {
        let mut guard = lock(&self.session);
        let Some(session) = guard.as_mut() else {
            return false;
        };
        match session.noop() {
            Ok(()) => true,
            Err(err) => {
                warn!(server = %self.connector.server, error = %err, "FTP session lost");
                *guard = None;
                false
            }
        }
    }

    fn open(&self) -> Result<()> {
        if self.is_open() {
            return Err(FsError::ConnectionAlreadyOpen);
        }
        let connector = &self.connector;
        let mut session =
            FtpSession::connect(&connector.server, connector.port, connector.timeout)?;
        session.login(&connector.credential.user, &connector.credential.password)?;
        session.binary()?;
        session.set_passive(connector.passive);
        session.mark_home()?;
        if let Some(cwd) = self.cwd.top() {
            session.cwd(&cwd)?;
        }
        info!(
            server = %connector.server,
            port = connector.port,
            user = %connector.credential.user,
            "FTP session opened"
        );
        *lock(&self.session) = Some(session);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let session = lock(&self.session)
            .take()
            .ok_or(FsError::ConnectionNotOpen)?;
        session.quit();
        info!(server = %self.connector.server, "FTP session closed");
        Ok(())
    }

    fn cwd_stack(&self) -> &CwdStack {
        &self.cwd
    }

    /// Sends `CWD` when a session is open; otherwise the stack top is applied
    /// on the next `open`. Clearing the stack returns to the login directory.
    fn apply_cwd(&self, location: Option<&str>) -> Result<()> {
        let mut guard = lock(&self.session);
        match (guard.as_mut(), location) {
            (Some(session), Some(location)) => session.cwd(location),
            (Some(session), None) => session.cwd_home(),
            (None, _) => Ok(()),
        }
    }

    fn abs_path(&self, path: &Path) -> Result<Path> {
        let location = self.check_path(path)?;
        let absolute = if location.starts_with('/') {
            location
        } else {
            let base = match self.cwd.top() {
                Some(cwd) => cwd,
                None => self.with_session(|session| session.pwd())?,
            };
            utils::join(&base, &location)
        };
        let normalized = utils::normalize(&absolute);
        Ok(Path::new(
            normalized.to_string_lossy().into_owned(),
            path.connection().clone(),
        ))
    }

    fn is_dir(&self, path: &Path) -> Result<bool> {
        let location = self.check_path(path)?;
        self.with_session(|session| answered(in_dir(session, &location, |_| Ok(()))))
    }

    fn is_file(&self, path: &Path) -> Result<bool> {
        answered(self.in_parent(path, |session, name| session.size(name)))
    }

    fn size(&self, path: &Path) -> Result<u64> {
        self.verify_is_file(path)?;
        self.in_parent(path, |session, name| session.size(name))
    }

    fn modified_time(&self, path: &Path) -> Result<SystemTime> {
        self.verify_exists(path)?;
        self.in_parent(path, |session, name| session.modified_time(name))
    }

    fn list(&self, path: &Path, pattern: &str) -> Result<Vec<String>> {
        self.verify_is_dir(path)?;
        let location = self.check_path(path)?;
        let pattern = GlobPattern::new(pattern)?;
        let listing = self.with_session(|session| in_dir(session, &location, FtpSession::name_list))?;
        let mut names: Vec<String> = listing
            .iter()
            .map(|entry| utils::base_name(entry).to_string())
            .filter(|name| name != "." && name != ".." && pattern.matches(name))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn open_file(&self, path: &Path, mode: OpenMode) -> Result<FileHandle> {
        let location = self.check_path(path)?;
        self.verify_is_not_dir(path)?;
        let exists = self.is_file(path)?;
        if mode.is_exclusive() && exists {
            return Err(FsError::FileExists(location));
        }
        if !exists && !mode.is_writable() {
            return Err(FsError::NotFound(location));
        }

        let staged = temp_file_path(&self.name(path))?;
        if exists && !mode.truncates() {
            if let Err(err) = self.download(path, &staged) {
                let _ = std::fs::remove_file(&staged);
                return Err(err);
            }
        }
        let writeback = if mode.is_writable() {
            Some(self.upload_on_flush(path)?)
        } else {
            None
        };
        let mut proxy = ProxyFile::open(location, staged, mode, writeback)?;
        if mode.is_writable() && (mode.truncates() || !exists) {
            proxy.mark_modified();
        }
        Ok(Box::new(proxy))
    }

    /// `DELE` for files; directories are emptied first, then `RMD`.
    fn remove(&self, path: &Path) -> Result<()> {
        if self.is_dir(path)? {
            for child in self.glob(path, "*")? {
                self.remove(&child)?;
            }
            let location = self.check_path(path)?;
            self.with_session(|session| session.remove_dir(&location))?;
        } else {
            self.verify_is_file(path)?;
            self.in_parent(path, |session, name| session.delete(name))?;
        }
        debug!(location = %path, "removed");
        Ok(())
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        self.in_parent(path, |session, name| session.make_dir(name))
    }

    /// Renames on the server with `RNFR`/`RNTO`.
    fn rename(&self, path: &Path, new_name: &str) -> Result<()> {
        if new_name.is_empty() || new_name.contains('/') {
            return Err(FsError::InvalidPath(new_name.to_string()));
        }
        if self.name(path) == new_name {
            return Ok(());
        }
        self.verify_exists(path)?;
        if let Some(parent) = self.dir(path) {
            self.verify_not_exists(&parent.join(new_name))?;
        }
        self.in_parent(path, |session, name| session.rename(name, new_name))
    }
}
