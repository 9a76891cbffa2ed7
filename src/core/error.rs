//! Error types shared by every file system backend.

use thiserror::Error;

use crate::core::BackendKind;

/// Errors produced by paths, connections and backends.
///
/// Variants carrying a `String` hold the checked location the error refers to.
#[derive(Error, Debug)]
pub enum FsError {
    /// The path is malformed or belongs to a different connection.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// No file or directory exists at the location.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// A directory was expected to be empty (or allowed to be cleared).
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// A file already exists where one must not.
    #[error("file exists: {0}")]
    FileExists(String),

    /// The location is a directory but a file was expected.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// The location is not a directory but a directory was expected.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The backend does not implement the requested operation.
    #[error("operation '{operation}' is not supported by the {backend} backend")]
    OperationNotSupported {
        operation: &'static str,
        backend: BackendKind,
    },

    /// More than one file matched where a unique match was required.
    #[error("multiple files match '{pattern}' in {location}")]
    AmbiguousMatch { pattern: String, location: String },

    #[error("connection is not open")]
    ConnectionNotOpen,

    #[error("connection is already open")]
    ConnectionAlreadyOpen,

    #[error("no default connection has been set")]
    NoDefaultConnection,

    /// The open mode string is malformed or not supported by the backend.
    #[error("unsupported open mode: {0}")]
    UnsupportedMode(String),

    /// The URL scheme has no backend.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// An FTP server replied with an unexpected status code.
    #[error("FTP error {code}: {message}")]
    Protocol { code: u32, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    pub(crate) fn unsupported(operation: &'static str, backend: BackendKind) -> Self {
        FsError::OperationNotSupported { operation, backend }
    }

    /// Returns `true` for errors that report a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound(_) => true,
            FsError::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<FsError> for std::io::Error {
    fn from(err: FsError) -> Self {
        match err {
            FsError::Io(err) => err,
            other => std::io::Error::other(other),
        }
    }
}
