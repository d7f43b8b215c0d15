use ferry_fs::FsError;
use thiserror::Error;

/// Task-level failures. Anything below this level is logged and skipped.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The filename filter does not compile. Raised before any I/O.
    #[error("Invalid source_regex {pattern:?}: {reason}")]
    Config { pattern: String, reason: String },

    /// Source or target could not be opened.
    #[error("Cannot open {side}: {source}")]
    Connection {
        side: &'static str,
        #[source]
        source: FsError,
    },
}

impl TransferError {
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::Config { .. } => "CONFIG_ERROR",
            TransferError::Connection { .. } => "CONNECTION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
