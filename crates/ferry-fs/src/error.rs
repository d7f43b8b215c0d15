//! Error types for the ferry-fs crate.

use ferry_core::BackendKind;
use thiserror::Error;

/// Every failure a backend can report. Paths are relative to the backend root
/// unless the variant says otherwise.
#[derive(Debug, Error)]
pub enum FsError {
    /// Dial, handshake or authentication failed.
    #[error("Connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    /// A remote backend was configured without credentials.
    #[error("{kind} backend requires auth")]
    MissingAuth { kind: BackendKind },

    /// The operation was issued before `init` or after `close`.
    #[error("{kind} backend is not connected")]
    NotConnected { kind: BackendKind },

    /// Local root could not be prepared.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot list {path}: {reason}")]
    List { path: String, reason: String },

    #[error("Cannot open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Cannot create {path}: {reason}")]
    Create { path: String, reason: String },

    #[error("Write to {path} failed: {reason}")]
    Write { path: String, reason: String },

    #[error("Cannot create directory {path}: {reason}")]
    Mkdir { path: String, reason: String },

    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("Cannot stat {path}: {reason}")]
    Stat { path: String, reason: String },

    #[error("Cannot remove {path}: {reason}")]
    Remove { path: String, reason: String },
}

impl FsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
