use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_HISTORY_PATH: &str = "history.json";
pub const DEFAULT_SFTP_PORT: u16 = 22;
pub const DEFAULT_FTP_PORT: u16 = 21;
/// Dial/handshake timeout for remote backends.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Top-level config (config.toml + FERRY_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// JSON file holding the transfer ledger.
    #[serde(default = "default_history_path")]
    pub path: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
        }
    }
}

/// One configured synchronization job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    /// Five/six-field cron expression, a `@daily`-style descriptor, or `@every 10m`.
    pub cron: String,
    pub source_type: BackendKind,
    pub source_path: String,
    /// Matched against the base file name only. Empty matches everything.
    #[serde(default)]
    pub source_regex: String,
    pub target_type: BackendKind,
    pub target_path: String,
    /// Destination files older than this many days are purged. `<= 0` disables cleanup.
    #[serde(default)]
    pub retention_days: i64,
    /// Only source files modified within this many days are considered. `<= 0` disables.
    #[serde(default)]
    pub source_newer_days: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_auth: Option<Auth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_auth: Option<Auth>,
}

impl TaskConfig {
    pub fn source(&self) -> Endpoint {
        Endpoint {
            kind: self.source_type,
            root: self.source_path.clone(),
            auth: self.source_auth.clone(),
        }
    }

    pub fn target(&self) -> Endpoint {
        Endpoint {
            kind: self.target_type,
            root: self.target_path.clone(),
            auth: self.target_auth.clone(),
        }
    }
}

/// Storage backend a task side lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Sftp,
    Ftp,
}

impl BackendKind {
    pub fn requires_auth(self) -> bool {
        !matches!(self, BackendKind::Local)
    }

    pub fn default_port(self) -> u16 {
        match self {
            BackendKind::Ftp => DEFAULT_FTP_PORT,
            _ => DEFAULT_SFTP_PORT,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::Local => "local",
            BackendKind::Sftp => "sftp",
            BackendKind::Ftp => "ftp",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "local" => Ok(BackendKind::Local),
            "sftp" => Ok(BackendKind::Sftp),
            "ftp" => Ok(BackendKind::Ftp),
            other => Err(format!("unknown backend type: {other}")),
        }
    }
}

/// Credentials for a remote backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct Auth {
    pub host: String,
    /// 0 means "use the protocol default".
    #[serde(default)]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Auth {
    /// `host:port`, falling back to the backend's well-known port.
    pub fn address(&self, kind: BackendKind) -> String {
        let port = if self.port == 0 {
            kind.default_port()
        } else {
            self.port
        };
        format!("{}:{}", self.host, port)
    }
}

// Keep passwords out of logs.
impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// One side of a task: where the files live and how to reach them.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub kind: BackendKind,
    pub root: String,
    pub auth: Option<Auth>,
}

fn default_history_path() -> String {
    DEFAULT_HISTORY_PATH.to_string()
}

impl SyncConfig {
    /// Load config from a TOML file with FERRY_* env var overrides.
    ///
    /// Unlike most figment setups a missing file is an error: without it
    /// there are no tasks to run.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or(DEFAULT_CONFIG_PATH);
        if !Path::new(path).exists() {
            return Err(ConfigError::Load(format!("config file not found: {path}")));
        }

        let config: SyncConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("FERRY_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        config.validate()?;
        debug!(path, tasks = config.tasks.len(), "config loaded");
        Ok(config)
    }

    /// Parse config from an in-memory TOML string (no env overrides).
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: SyncConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (index, task) in self.tasks.iter().enumerate() {
            if task.name.trim().is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if !seen.insert(task.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    name: task.name.clone(),
                });
            }
            for (side, kind, auth) in [
                ("source", task.source_type, &task.source_auth),
                ("target", task.target_type, &task.target_auth),
            ] {
                if kind.requires_auth() && auth.is_none() {
                    return Err(ConfigError::MissingAuth {
                        task: task.name.clone(),
                        side,
                        kind: kind.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
