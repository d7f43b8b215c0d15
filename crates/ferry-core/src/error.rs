use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(String),

    #[error("Task name must not be empty (task #{index})")]
    EmptyName { index: usize },

    #[error("Duplicate task name: {name}")]
    DuplicateName { name: String },

    #[error("Task {task}: {side} type is {kind} but no {side}_auth is configured")]
    MissingAuth {
        task: String,
        side: &'static str,
        kind: String,
    },
}

impl ConfigError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Load(_) => "CONFIG_LOAD",
            ConfigError::EmptyName { .. } => "EMPTY_TASK_NAME",
            ConfigError::DuplicateName { .. } => "DUPLICATE_TASK_NAME",
            ConfigError::MissingAuth { .. } => "MISSING_AUTH",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
