//! Connection identity, the working directory stack and scoped opening.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::Path;
use crate::core::{FsBackend, Result};

/// The backend family a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Local,
    Ftp,
    Http,
    Stdio,
}

impl BackendKind {
    /// The URL scheme that selects this backend.
    pub fn scheme(&self) -> &'static str {
        match self {
            BackendKind::Local => "file",
            BackendKind::Ftp => "ftp",
            BackendKind::Http => "http",
            BackendKind::Stdio => "stdio",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Local => "local",
            other => other.scheme(),
        };
        f.write_str(name)
    }
}

/// Identifies a connection for equality checks.
///
/// Stateless backends share one identity per kind, so every local connection
/// accepts every local path. Session-bound backends (FTP) get a unique
/// identity per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    kind: BackendKind,
    session: Option<u64>,
}

impl ConnectionId {
    pub fn shared(kind: BackendKind) -> Self {
        Self { kind, session: None }
    }

    pub fn unique(kind: BackendKind) -> Self {
        static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);
        Self {
            kind,
            session: Some(NEXT_SESSION.fetch_add(1, Ordering::Relaxed)),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn session(&self) -> Option<u64> {
        self.session
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.session {
            Some(session) => write!(f, "{}#{}", self.kind, session),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Stack of working directories kept by a connection.
///
/// The bottom entry is never popped: once a working directory has been set
/// it stays set until [`CwdStack::clear`].
#[derive(Debug, Default)]
pub struct CwdStack {
    entries: Mutex<Vec<String>>,
}

impl CwdStack {
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn top(&self) -> Option<String> {
        self.lock().last().cloned()
    }

    /// Replaces the top entry, or pushes one onto an empty stack.
    pub fn set(&self, location: String) {
        let mut entries = self.lock();
        match entries.last_mut() {
            Some(top) => *top = location,
            None => entries.push(location),
        }
    }

    pub fn push(&self, location: String) {
        self.lock().push(location);
    }

    /// Pops the top entry unless it is the only one, in which case it is
    /// returned but kept.
    pub fn pop(&self) -> Option<String> {
        let mut entries = self.lock();
        match entries.len() {
            0 => None,
            1 => entries.last().cloned(),
            _ => entries.pop(),
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn depth(&self) -> usize {
        self.lock().len()
    }
}

/// Factory for connections to one backend target.
///
/// A connector owns no live resources; it only describes where to connect.
pub trait FsConnector: fmt::Debug {
    type Connection: FsBackend + 'static;

    /// Working directory applied to every new connection.
    fn initial_cwd(&self) -> Option<&str> {
        None
    }

    /// Builds a connection without opening it.
    fn new_connection(&self) -> Result<Self::Connection>;

    /// Builds a connection and applies the initial working directory.
    fn connect(&self) -> Result<Arc<Self::Connection>> {
        let connection = Arc::new(self.new_connection()?);
        if let Some(cwd) = self.initial_cwd() {
            connection.set_cwd(&Path::new(cwd, connection.clone()))?;
        }
        Ok(connection)
    }
}

/// Keeps a connection open for the lifetime of the guard.
///
/// # Notes
///
/// The connection is closed on drop if it is still open. A failure to close
/// is logged, never raised.
pub struct OpenConnection {
    connection: Arc<dyn FsBackend>,
}

impl OpenConnection {
    /// Opens `connection` and wraps it in a guard.
    pub fn open(connection: Arc<dyn FsBackend>) -> Result<Self> {
        connection.open()?;
        Ok(Self { connection })
    }

    pub fn connection(&self) -> &Arc<dyn FsBackend> {
        &self.connection
    }

    /// Builds a path on the guarded connection.
    pub fn path(&self, location: impl Into<String>) -> Path {
        Path::new(location, self.connection.clone())
    }
}

impl Deref for OpenConnection {
    type Target = dyn FsBackend;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        if !self.connection.is_open() {
            return;
        }
        if let Err(err) = self.connection.close() {
            warn!(connection = %self.connection.id(), error = %err, "failed to close connection");
        }
    }
}
