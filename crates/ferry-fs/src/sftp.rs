use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ferry_core::config::CONNECT_TIMEOUT_SECS;
use ferry_core::BackendKind;
use ssh2::{ErrorCode, FileStat, Session, Sftp};
use tracing::{debug, info};

use crate::error::{FsError, Result};
use crate::path::{ancestors, base_name, join_rel, remote_path};
use crate::types::{Capabilities, FileEntry, FileSystem, FlushOnCommit, WriteStream};

/// libssh2's `LIBSSH2_FX_NO_SUCH_FILE`.
const FX_NO_SUCH_FILE: i32 = 2;

/// SFTP over a password-authenticated SSH session.
///
/// Host keys are not verified.
pub struct SftpFs {
    addr: String,
    user: String,
    password: String,
    root: String,
    session: Option<Session>,
    sftp: Option<Sftp>,
}

impl SftpFs {
    pub fn new(addr: String, user: String, password: String, root: String) -> Self {
        Self {
            addr,
            user,
            password,
            root,
            session: None,
            sftp: None,
        }
    }

    fn client(&self) -> Result<&Sftp> {
        self.sftp.as_ref().ok_or(FsError::NotConnected {
            kind: BackendKind::Sftp,
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

    fn dial(&self) -> Result<TcpStream> {
        let timeout = Duration::from_secs(CONNECT_TIMEOUT_SECS);
        let addrs = self
            .addr
            .to_socket_addrs()
            .map_err(|e| self.connect_err(e))?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(match last_err {
            Some(e) => self.connect_err(e),
            None => self.connect_err("address resolved to nothing"),
        })
    }
}

fn entry_from(name: String, path: String, stat: &FileStat) -> FileEntry {
    let modified = stat
        .mtime
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0))
        .unwrap_or_default();
    FileEntry {
        name,
        size: stat.size.unwrap_or(0),
        modified,
        is_dir: stat.is_dir(),
        path,
    }
}

fn stat_error(path: &str, e: &ssh2::Error) -> FsError {
    if matches!(e.code(), ErrorCode::SFTP(FX_NO_SUCH_FILE)) {
        FsError::NotFound {
            path: path.to_string(),
        }
    } else {
        FsError::Stat {
            path: path.to_string(),
            reason: e.to_string(),
        }
    }
}

impl FileSystem for SftpFs {
    fn kind(&self) -> BackendKind {
        BackendKind::Sftp
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_stat: true,
            // One stat/mkdir round trip per level.
            native_mkdir_all: false,
        }
    }

    fn init(&mut self) -> Result<()> {
        let tcp = self.dial()?;
        let mut session = Session::new().map_err(|e| self.connect_err(e))?;
        session.set_tcp_stream(tcp);
        session.set_timeout((CONNECT_TIMEOUT_SECS * 1000) as u32);
        session.handshake().map_err(|e| self.connect_err(e))?;
        session
            .userauth_password(&self.user, &self.password)
            .map_err(|e| self.connect_err(e))?;
        if !session.authenticated() {
            return Err(self.connect_err("authentication rejected"));
        }
        let sftp = session.sftp().map_err(|e| self.connect_err(e))?;
        info!(addr = %self.addr, user = %self.user, root = %self.root, "sftp session established");
        self.session = Some(session);
        self.sftp = Some(sftp);
        Ok(())
    }

    fn close(&mut self) {
        // Channel first, then the transport.
        self.sftp.take();
        if let Some(session) = self.session.take() {
            if let Err(e) = session.disconnect(None, "ferry closing", None) {
                debug!(addr = %self.addr, error = %e, "sftp disconnect failed");
            }
        }
    }

    fn list(&mut self, path: &str) -> Result<Vec<FileEntry>> {
        let full = self.full(path);
        let entries = self
            .client()?
            .readdir(Path::new(&full))
            .map_err(|e| FsError::List {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(entries
            .into_iter()
            .filter_map(|(p, stat)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                if name == "." || name == ".." {
                    return None;
                }
                let rel = join_rel(path, &name);
                Some(entry_from(name, rel, &stat))
            })
            .collect())
    }

    fn open(&mut self, path: &str) -> Result<Box<dyn Read + Send + '_>> {
        let full = self.full(path);
        let file = self
            .client()?
            .open(Path::new(&full))
            .map_err(|e| FsError::Open {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(file))
    }

    fn create(&mut self, path: &str) -> Result<Box<dyn WriteStream + '_>> {
        let full = self.full(path);
        let file = self
            .client()?
            .create(Path::new(&full))
            .map_err(|e| FsError::Create {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(FlushOnCommit::new(file, path)))
    }

    fn mkdir_all(&mut self, path: &str) -> Result<()> {
        let full = self.full(path);
        let sftp = self.client()?;
        let err = |dir: &str, reason: String| FsError::Mkdir {
            path: dir.to_string(),
            reason,
        };
        for dir in ancestors(&full) {
            let dir_path = Path::new(&dir);
            match sftp.stat(dir_path) {
                Ok(stat) if stat.is_dir() => continue,
                Ok(_) => return Err(err(&dir, "a file with that name exists".into())),
                Err(_) => {}
            }
            if let Err(e) = sftp.mkdir(dir_path, 0o755) {
                // A concurrent creator may have won the race; re-check before failing.
                match sftp.stat(dir_path) {
                    Ok(stat) if stat.is_dir() => {}
                    _ => return Err(err(&dir, e.to_string())),
                }
            }
        }
        Ok(())
    }

    fn stat(&mut self, path: &str) -> Result<FileEntry> {
        let full = self.full(path);
        let stat = self
            .client()?
            .stat(Path::new(&full))
            .map_err(|e| stat_error(path, &e))?;
        Ok(entry_from(
            base_name(path).to_string(),
            path.to_string(),
            &stat,
        ))
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        let full = self.full(path);
        self.client()?
            .unlink(Path::new(&full))
            .map_err(|e| FsError::Remove {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Drop for SftpFs {
    fn drop(&mut self) {
        self.close();
    }
}
