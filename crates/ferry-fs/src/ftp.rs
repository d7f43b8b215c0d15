use std::io::{Read, Write};
use std::net::ToSocketAddrs;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ferry_core::config::CONNECT_TIMEOUT_SECS;
use ferry_core::BackendKind;
use suppaftp::list::File as ListLine;
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tracing::{debug, info, warn};

use crate::error::{FsError, Result};
use crate::path::{ancestors, base_name, join_rel, remote_path, split_remote};
use crate::types::{Capabilities, FileEntry, FileSystem, WriteStream};

/// Plain FTP, binary mode.
///
/// FTP has no stat and no recursive mkdir: `stat` lists the parent and scans
/// for the name, `mkdir_all` issues one MKD per level and ignores failures.
pub struct FtpFs {
    addr: String,
    user: String,
    password: String,
    root: String,
    conn: Option<FtpStream>,
}

impl FtpFs {
    pub fn new(addr: String, user: String, password: String, root: String) -> Self {
        Self {
            addr,
            user,
            password,
            root,
            conn: None,
        }
    }

    fn conn(&mut self) -> Result<&mut FtpStream> {
        self.conn.as_mut().ok_or(FsError::NotConnected {
            kind: BackendKind::Ftp,
        })
    }

    fn full(&self, path: &str) -> String {
        remote_path(&self.root, path)
    }

    fn connect_err(&self, e: impl std::fmt::Display) -> FsError {
        FsError::Connection {
            addr: self.addr.clone(),
            reason: e.to_string(),
        }
    }

    /// Raw LIST lines of a remote directory (`None` = server's current directory).
    fn list_remote(&mut self, dir: Option<&str>) -> std::result::Result<Vec<String>, String> {
        self.conn()
            .map_err(|e| e.to_string())?
            .list(dir)
            .map_err(|e| e.to_string())
    }
}

/// Parse LIST output (UNIX or DOS style). Unparseable lines and the `.`/`..`
/// entries are dropped.
fn parse_listing(lines: &[String]) -> Vec<ListLine> {
    lines
        .iter()
        .filter_map(|line| match line.parse::<ListLine>() {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(%line, error = ?e, "unparseable LIST line");
                None
            }
        })
        .filter(|entry| entry.name() != "." && entry.name() != "..")
        .collect()
}

fn entry_from(line: &ListLine, path: String) -> FileEntry {
    FileEntry {
        name: line.name().to_string(),
        size: line.size() as u64,
        modified: DateTime::<Utc>::from(line.modified()),
        is_dir: line.is_directory(),
        path,
    }
}

/// Entries of the listing of relative directory `dir`.
fn entries_from_lines(lines: &[String], dir: &str) -> Vec<FileEntry> {
    parse_listing(lines)
        .iter()
        .map(|line| entry_from(line, join_rel(dir, line.name())))
        .collect()
}

/// Synthesized stat: scan the parent's listing for `name`.
fn find_entry(lines: &[String], name: &str, path: &str) -> Result<FileEntry> {
    parse_listing(lines)
        .iter()
        .find(|line| line.name() == name)
        .map(|line| {
            let mut entry = entry_from(line, path.to_string());
            entry.name = base_name(path).to_string();
            entry
        })
        .ok_or_else(|| FsError::NotFound {
            path: path.to_string(),
        })
}

impl FileSystem for FtpFs {
    fn kind(&self) -> BackendKind {
        BackendKind::Ftp
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_stat: false,
            native_mkdir_all: false,
        }
    }

    fn init(&mut self) -> Result<()> {
        let sock = self
            .addr
            .to_socket_addrs()
            .map_err(|e| self.connect_err(e))?
            .next()
            .ok_or_else(|| self.connect_err("address resolved to nothing"))?;
        let mut conn =
            FtpStream::connect_timeout(sock, Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .map_err(|e| self.connect_err(e))?;
        if let Err(e) = conn.login(&self.user, &self.password) {
            let _ = conn.quit();
            return Err(self.connect_err(e));
        }
        if let Err(e) = conn.transfer_type(FileType::Binary) {
            let _ = conn.quit();
            return Err(self.connect_err(e));
        }
        info!(addr = %self.addr, user = %self.user, root = %self.root, "ftp session established");
        self.conn = Some(conn);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.quit() {
                debug!(addr = %self.addr, error = %e, "ftp quit failed");
            }
        }
    }

    fn list(&mut self, path: &str) -> Result<Vec<FileEntry>> {
        let full = self.full(path);
        let lines = self
            .list_remote(Some(&full))
            .map_err(|reason| FsError::List {
                path: path.to_string(),
                reason,
            })?;
        Ok(entries_from_lines(&lines, path))
    }

    fn open(&mut self, path: &str) -> Result<Box<dyn Read + Send + '_>> {
        let full = self.full(path);
        let conn = self.conn()?;
        let data = conn.retr_as_stream(&full).map_err(|e| FsError::Open {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(FtpReader {
            conn,
            data: Some(Box::new(data)),
        }))
    }

    fn create(&mut self, path: &str) -> Result<Box<dyn WriteStream + '_>> {
        let full = self.full(path);
        let conn = self.conn()?;
        let data = conn.put_with_stream(&full).map_err(|e| FsError::Create {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(FtpWriter {
            conn,
            data: Some(Box::new(data)),
            path: path.to_string(),
        }))
    }

    fn mkdir_all(&mut self, path: &str) -> Result<()> {
        let full = self.full(path);
        let conn = self.conn()?;
        // "Already exists" and real failures look the same over FTP, so the
        // result is advisory; a later create surfaces anything that matters.
        for dir in ancestors(&full) {
            if let Err(e) = conn.mkdir(&dir) {
                debug!(%dir, error = %e, "MKD failed (ignored)");
            }
        }
        Ok(())
    }

    fn stat(&mut self, path: &str) -> Result<FileEntry> {
        let full = self.full(path);
        let (parent, name) = split_remote(&full);
        let name = name.to_string();
        let parent = parent.map(str::to_string);
        let lines = self
            .list_remote(parent.as_deref())
            .map_err(|reason| FsError::Stat {
                path: path.to_string(),
                reason,
            })?;
        find_entry(&lines, &name, path)
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        let full = self.full(path);
        self.conn()?.rm(&full).map_err(|e| FsError::Remove {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Drop for FtpFs {
    fn drop(&mut self) {
        self.close();
    }
}

/// RETR data stream. The control connection expects the transfer to be
/// finalized before the next command, which happens on drop.
struct FtpReader<'a> {
    conn: &'a mut FtpStream,
    data: Option<Box<dyn Read + Send>>,
}

impl Read for FtpReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.data.as_mut() {
            Some(data) => data.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for FtpReader<'_> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            if let Err(e) = self.conn.finalize_retr_stream(data) {
                debug!(error = %e, "finalizing RETR failed");
            }
        }
    }
}

/// STOR data stream. `commit` closes the data connection and waits for the
/// server's completion reply.
struct FtpWriter<'a> {
    conn: &'a mut FtpStream,
    data: Option<Box<dyn Write + Send>>,
    path: String,
}

impl Write for FtpWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.data.as_mut() {
            Some(data) => data.write(buf),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "upload already finalized",
            )),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.data.as_mut() {
            Some(data) => data.flush(),
            None => Ok(()),
        }
    }
}

impl WriteStream for FtpWriter<'_> {
    fn commit(mut self: Box<Self>) -> Result<()> {
        let Some(mut data) = self.data.take() else {
            return Ok(());
        };
        let path = self.path.clone();
        let err = |reason: String| FsError::Write {
            path: path.clone(),
            reason,
        };
        data.flush().map_err(|e| err(e.to_string()))?;
        self.conn
            .finalize_put_stream(data)
            .map_err(|e| err(e.to_string()))
    }
}

impl Drop for FtpWriter<'_> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            warn!(path = %self.path, "upload dropped without commit; server may keep a partial file");
            if let Err(e) = self.conn.finalize_put_stream(data) {
                debug!(path = %self.path, error = %e, "finalizing STOR failed");
            }
        }
    }
}
