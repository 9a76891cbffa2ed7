//! Default-connection context used to build paths from bare locations.

use std::sync::Arc;

use crate::core::{FsBackend, FsError, Result};
use crate::{LocalConnector, Path};

/// Holds the connection used for paths built without an explicit one.
///
/// A context is an ordinary value; pass it to the code that needs it.
#[derive(Debug, Clone, Default)]
pub struct FsContext {
    default_connection: Option<Arc<dyn FsBackend>>,
}

impl FsContext {
    /// A context without a default connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose default is a local connection.
    pub fn local() -> Self {
        Self::with_default(LocalConnector::default().connection())
    }

    pub fn with_default(connection: Arc<dyn FsBackend>) -> Self {
        Self {
            default_connection: Some(connection),
        }
    }

    pub fn default_connection(&self) -> Option<&Arc<dyn FsBackend>> {
        self.default_connection.as_ref()
    }

    /// Replaces (or clears) the default connection.
    pub fn set_default_connection(&mut self, connection: Option<Arc<dyn FsBackend>>) {
        self.default_connection = connection;
    }

    /// Builds a path on the default connection.
    ///
    /// # Returns
    ///
    /// * `Err(FsError::NoDefaultConnection)` - if no default has been set.
    pub fn path(&self, location: impl Into<String>) -> Result<Path> {
        let connection = self
            .default_connection
            .clone()
            .ok_or(FsError::NoDefaultConnection)?;
        Ok(Path::new(location, connection))
    }
}
