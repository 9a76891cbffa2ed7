//! Named connections loaded from TOML.
//!
//! ```toml
//! default = "archive"
//!
//! [connections.archive]
//! kind = "ftp"
//! server = "ftp.example.com"
//! user = "alice"
//! password_env = "ARCHIVE_PASSWORD"
//! initial_cwd = "/pub"
//!
//! [connections.scratch]
//! kind = "local"
//! initial_cwd = "/tmp"
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::{
    AnyConnector, Credential, FsBackend, FsContext, FtpConnector, HttpConnector, LocalConnector,
    StdioConnector,
};

fn default_ftp_port() -> u16 {
    21
}

fn default_user() -> String {
    "anonymous".to_string()
}

fn default_passive() -> bool {
    true
}

/// One connection, selected by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConnectorConfig {
    Local {
        initial_cwd: Option<String>,
    },
    Ftp {
        server: String,
        #[serde(default = "default_ftp_port")]
        port: u16,
        #[serde(default = "default_user")]
        user: String,
        /// Plain password. Prefer `password_env`.
        password: Option<String>,
        /// Name of the environment variable holding the password.
        password_env: Option<String>,
        #[serde(default = "default_passive")]
        passive: bool,
        initial_cwd: Option<String>,
    },
    Http {
        initial_cwd: Option<String>,
    },
    Stdio,
}

impl ConnectorConfig {
    /// Builds the connector, resolving `password_env` from the environment.
    pub fn to_connector(&self) -> Result<AnyConnector> {
        let connector: AnyConnector = match self {
            ConnectorConfig::Local { initial_cwd } => match initial_cwd {
                Some(cwd) => LocalConnector::with_initial_cwd(cwd.clone()),
                None => LocalConnector::new(),
            }
            .into(),
            ConnectorConfig::Ftp {
                server,
                port,
                user,
                password,
                password_env,
                passive,
                initial_cwd,
            } => {
                let password = match (password, password_env) {
                    (Some(_), Some(_)) => {
                        bail!("`password` and `password_env` are mutually exclusive for {server}")
                    }
                    (Some(password), None) => password.clone(),
                    (None, Some(variable)) => std::env::var(variable).with_context(|| {
                        format!("reading the password for {server} from ${variable}")
                    })?,
                    (None, None) => String::new(),
                };
                let mut connector = FtpConnector::new(server.clone(), Credential::new(user.clone(), password))
                    .port(*port)
                    .passive(*passive);
                if let Some(cwd) = initial_cwd {
                    connector = connector.initial_cwd(cwd.clone());
                }
                connector.into()
            }
            ConnectorConfig::Http { initial_cwd } => match initial_cwd {
                Some(cwd) => HttpConnector::with_initial_cwd(cwd.clone()),
                None => HttpConnector::new(),
            }
            .into(),
            ConnectorConfig::Stdio => StdioConnector.into(),
        };
        Ok(connector)
    }
}

/// A set of named connections and the one to use by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsConfig {
    /// Name of the default connection; local when absent.
    pub default: Option<String>,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectorConfig>,
}

impl FsConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: FsConfig = toml::from_str(text).context("parsing file system configuration")?;
        if let Some(name) = &config.default {
            if !config.connections.contains_key(name) {
                bail!("default connection `{name}` is not defined");
            }
        }
        Ok(config)
    }

    pub fn load(file: impl AsRef<std::path::Path>) -> Result<Self> {
        let file = file.as_ref();
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("reading {}", file.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("loading {}", file.display()))
    }

    pub fn connector(&self, name: &str) -> Result<AnyConnector> {
        self.connections
            .get(name)
            .with_context(|| format!("unknown connection `{name}`"))?
            .to_connector()
    }

    /// Builds the named connection. FTP connections are returned closed.
    pub fn connect(&self, name: &str) -> Result<Arc<dyn FsBackend>> {
        self.connector(name)?
            .connect()
            .with_context(|| format!("connecting `{name}`"))
    }

    /// A context whose default is the configured default connection, or a
    /// local connection when none is configured.
    pub fn context(&self) -> Result<FsContext> {
        match &self.default {
            Some(name) => Ok(FsContext::with_default(self.connect(name)?)),
            None => Ok(FsContext::local()),
        }
    }
}
