//! Read-only HTTP backend.
//!
//! Locations are full URLs. Metadata comes from `HEAD` requests; opening a
//! file downloads it into a local proxy file.

use std::fs::File;
use std::time::SystemTime;

use chrono::DateTime;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_LENGTH, HeaderMap, LAST_MODIFIED};
use tracing::debug;

use crate::Path;
use crate::core::{
    BackendKind, ConnectionId, CwdStack, FileHandle, FsBackend, FsConnector, FsError, OpenMode,
    Result,
};
use crate::vfs::proxy::ProxyFile;
use crate::vfs::temp::temp_file_path;

/// Connector for HTTP(S) servers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpConnector {
    initial_cwd: Option<String>,
}

impl HttpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_cwd(cwd: impl Into<String>) -> Self {
        Self {
            initial_cwd: Some(cwd.into()),
        }
    }
}

impl FsConnector for HttpConnector {
    type Connection = HttpConnection;

    fn initial_cwd(&self) -> Option<&str> {
        self.initial_cwd.as_deref()
    }

    fn new_connection(&self) -> Result<HttpConnection> {
        HttpConnection::new()
    }
}

/// A stateless connection to HTTP(S) servers; always open.
#[derive(Debug)]
pub struct HttpConnection {
    client: Client,
    cwd: CwdStack,
}

fn is_missing(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND || status == StatusCode::GONE
}

fn header<'a>(headers: &'a HeaderMap, name: reqwest::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

impl HttpConnection {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            cwd: CwdStack::default(),
        })
    }

    /// Sends a `HEAD` request; `None` when the resource does not exist.
    fn head(&self, path: &Path) -> Result<Option<Response>> {
        let url = self.check_path(path)?;
        let response = self.client.head(&url).send()?;
        debug!(url = %url, status = %response.status(), "HEAD");
        if is_missing(response.status()) {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?))
    }

    fn existing_head(&self, path: &Path) -> Result<Response> {
        self.head(path)?
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    fn download(&self, url: &str, target: &std::path::Path) -> Result<()> {
        let mut response = self.client.get(url).send()?;
        debug!(url, status = %response.status(), "GET");
        if is_missing(response.status()) {
            return Err(FsError::NotFound(url.to_string()));
        }
        let mut staged = File::create(target)?;
        response.error_for_status_ref()?;
        response.copy_to(&mut staged)?;
        Ok(())
    }
}

impl FsBackend for HttpConnection {
    fn id(&self) -> ConnectionId {
        ConnectionId::shared(BackendKind::Http)
    }

    fn cwd_stack(&self) -> &CwdStack {
        &self.cwd
    }

    /// URLs never name listable directories.
    fn is_dir(&self, path: &Path) -> Result<bool> {
        self.check_path(path)?;
        Ok(false)
    }

    fn is_file(&self, path: &Path) -> Result<bool> {
        Ok(self.head(path)?.is_some())
    }

    /// Taken from the `Content-Length` header.
    fn size(&self, path: &Path) -> Result<u64> {
        let response = self.existing_head(path)?;
        header(response.headers(), CONTENT_LENGTH)
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| FsError::unsupported("size", BackendKind::Http))
    }

    /// Taken from the `Last-Modified` header.
    fn modified_time(&self, path: &Path) -> Result<SystemTime> {
        let response = self.existing_head(path)?;
        header(response.headers(), LAST_MODIFIED)
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(SystemTime::from)
            .ok_or_else(|| FsError::unsupported("modified_time", BackendKind::Http))
    }

    fn open_file(&self, path: &Path, mode: OpenMode) -> Result<FileHandle> {
        let url = self.check_path(path)?;
        if mode.is_writable() {
            return Err(FsError::UnsupportedMode(format!("{mode} on {url}")));
        }
        let staged = temp_file_path(&self.name(path))?;
        if let Err(err) = self.download(&url, &staged) {
            let _ = std::fs::remove_file(&staged);
            return Err(err);
        }
        Ok(Box::new(ProxyFile::open(url, staged, mode, None)?))
    }
}
