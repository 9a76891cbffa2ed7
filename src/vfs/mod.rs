mod ftp;
mod http;
mod local;
mod proxy;
mod stdio;
mod temp;

use std::sync::Arc;

use url::Url;

pub use ftp::{Credential, FtpConnection, FtpConnector};
pub use http::{HttpConnection, HttpConnector};
pub use local::{LocalConnection, LocalConnector};
pub use proxy::{ProxyFile, Writeback};
pub use stdio::{StdioConnection, StdioConnector};
pub use temp::{TempFile, temp_file_path};

use crate::Path;
use crate::core::{FsBackend, FsConnector, FsError, Result};

/// Any of the built-in connectors, for code that picks a backend at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyConnector {
    Local(LocalConnector),
    Ftp(FtpConnector),
    Http(HttpConnector),
    Stdio(StdioConnector),
}

impl AnyConnector {
    /// Builds a connection with the connector's initial working directory.
    /// FTP connections still have to be opened.
    pub fn connect(&self) -> Result<Arc<dyn FsBackend>> {
        match self {
            AnyConnector::Local(connector) => connect_dyn(connector),
            AnyConnector::Ftp(connector) => connect_dyn(connector),
            AnyConnector::Http(connector) => connect_dyn(connector),
            AnyConnector::Stdio(connector) => connect_dyn(connector),
        }
    }
}

fn connect_dyn<C: FsConnector>(connector: &C) -> Result<Arc<dyn FsBackend>> {
    let connection: Arc<dyn FsBackend> = connector.connect()?;
    Ok(connection)
}

impl From<LocalConnector> for AnyConnector {
    fn from(connector: LocalConnector) -> Self {
        AnyConnector::Local(connector)
    }
}

impl From<FtpConnector> for AnyConnector {
    fn from(connector: FtpConnector) -> Self {
        AnyConnector::Ftp(connector)
    }
}

impl From<HttpConnector> for AnyConnector {
    fn from(connector: HttpConnector) -> Self {
        AnyConnector::Http(connector)
    }
}

impl From<StdioConnector> for AnyConnector {
    fn from(connector: StdioConnector) -> Self {
        AnyConnector::Stdio(connector)
    }
}

/// Turns a URL into a path on a fresh connection.
///
/// # Arguments
///
/// * `url` - `file://`, `ftp://[user@]host[:port]/path`, `http(s)://...`,
///   `stdio://stdin|stdout|stderr`, or a bare local path.
/// * `password` - FTP password. Without one the login is anonymous.
///
/// # Returns
///
/// * `Err(FsError::InvalidPath)` - the URL is malformed, or an FTP URL
///   carries a password.
/// * `Err(FsError::UnsupportedScheme)` - no backend handles the scheme.
///
/// # Notes
///
/// FTP connections are returned closed; open them with
/// [`OpenConnection`](crate::OpenConnection).
pub fn load_url(url: &str, password: Option<&str>) -> Result<Path> {
    if !url.contains("://") {
        return Ok(Path::new(url, LocalConnector::default().connection()));
    }
    let parsed = Url::parse(url).map_err(|err| FsError::InvalidPath(format!("{url}: {err}")))?;
    match parsed.scheme() {
        "file" => {
            let location = parsed
                .to_file_path()
                .map_err(|()| FsError::InvalidPath(url.to_string()))?;
            Ok(Path::new(
                location.to_string_lossy().into_owned(),
                LocalConnector::default().connection(),
            ))
        }
        "ftp" => {
            if parsed.password().is_some() {
                return Err(FsError::InvalidPath(format!(
                    "{}: pass the password separately",
                    parsed.host_str().unwrap_or_default()
                )));
            }
            let server = parsed
                .host_str()
                .ok_or_else(|| FsError::InvalidPath(url.to_string()))?;
            let credential = match (parsed.username(), password) {
                ("", None) => Credential::anonymous(),
                ("", Some(password)) => Credential::new("anonymous", password),
                (user, password) => Credential::new(user, password.unwrap_or_default()),
            };
            let mut connector = FtpConnector::new(server, credential);
            if let Some(port) = parsed.port() {
                connector = connector.port(port);
            }
            Ok(Path::new(parsed.path(), connect_dyn(&connector)?))
        }
        "http" | "https" => {
            Ok(Path::new(parsed.as_str(), connect_dyn(&HttpConnector::new())?))
        }
        "stdio" => {
            let stream = parsed
                .host_str()
                .ok_or_else(|| FsError::InvalidPath(url.to_string()))?;
            Ok(Path::new(stream, StdioConnector.connection()))
        }
        other => Err(FsError::UnsupportedScheme(other.to_string())),
    }
}
