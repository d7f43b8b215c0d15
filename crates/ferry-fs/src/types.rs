use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use ferry_core::BackendKind;

use crate::error::{FsError, Result};

/// One directory entry as reported by a backend. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
    /// Path relative to the backend root, `/`-separated, no leading slash.
    pub path: String,
}

/// Which operations a backend performs natively and which are synthesized.
///
/// | Backend | `stat`                   | `mkdir_all`                              |
/// |---------|--------------------------|------------------------------------------|
/// | local   | native, O(1)             | native                                   |
/// | sftp    | native, O(1)             | synthesized, stat+mkdir per level        |
/// | ftp     | synthesized, LIST parent | synthesized, one MKD per level, advisory |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub native_stat: bool,
    pub native_mkdir_all: bool,
}

/// A writable destination stream. `commit` completes the upload and reports
/// failures that a plain `Drop` would swallow.
pub trait WriteStream: Write + Send {
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Uniform capability surface over local disk, SFTP and FTP.
///
/// All paths are relative to the root the instance was built with. Methods
/// take `&mut self` because FTP multiplexes everything over one control
/// connection.
pub trait FileSystem: Send {
    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> Capabilities;

    /// Create the local root, or dial and authenticate the remote session.
    fn init(&mut self) -> Result<()>;

    /// Release the session. Idempotent; failures are logged, never returned.
    fn close(&mut self);

    /// Immediate children of a directory, excluding `.` and `..`.
    fn list(&mut self, path: &str) -> Result<Vec<FileEntry>>;

    fn open(&mut self, path: &str) -> Result<Box<dyn Read + Send + '_>>;

    /// Create or truncate a file.
    fn create(&mut self, path: &str) -> Result<Box<dyn WriteStream + '_>>;

    fn mkdir_all(&mut self, path: &str) -> Result<()>;

    fn stat(&mut self, path: &str) -> Result<FileEntry>;

    /// Delete a file. Directories are rejected.
    fn remove(&mut self, path: &str) -> Result<()>;
}

/// `WriteStream` for backends whose handle finishes the upload on flush/drop.
pub(crate) struct FlushOnCommit<W> {
    inner: W,
    path: String,
}

impl<W> FlushOnCommit<W> {
    pub(crate) fn new(inner: W, path: &str) -> Self {
        Self {
            inner,
            path: path.to_string(),
        }
    }
}

impl<W: Write> Write for FlushOnCommit<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> WriteStream for FlushOnCommit<W> {
    fn commit(mut self: Box<Self>) -> Result<()> {
        self.inner.flush().map_err(|e| FsError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}
