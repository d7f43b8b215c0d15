use std::fs;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ferry_core::BackendKind;
use tracing::debug;

use crate::error::{FsError, Result};
use crate::path::{base_name, join_rel};
use crate::types::{Capabilities, FileEntry, FileSystem, FlushOnCommit, WriteStream};

/// Local disk rooted at a directory. Holds no session.
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }
}

fn modified_of(meta: &fs::Metadata) -> DateTime<Utc> {
    meta.modified().map(DateTime::<Utc>::from).unwrap_or_default()
}

impl FileSystem for LocalFs {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_stat: true,
            native_mkdir_all: true,
        }
    }

    fn init(&mut self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|source| FsError::Io {
            path: self.root.display().to_string(),
            source,
        })
    }

    fn close(&mut self) {}

    fn list(&mut self, path: &str) -> Result<Vec<FileEntry>> {
        let err = |e: std::io::Error| FsError::List {
            path: path.to_string(),
            reason: e.to_string(),
        };
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.full(path)).map_err(err)? {
            let entry = entry.map_err(err)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            // Entries can vanish between readdir and stat.
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    debug!(path, %name, error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            entries.push(FileEntry {
                size: meta.len(),
                modified: modified_of(&meta),
                is_dir: meta.is_dir(),
                path: join_rel(path, &name),
                name,
            });
        }
        Ok(entries)
    }

    fn open(&mut self, path: &str) -> Result<Box<dyn Read + Send + '_>> {
        let file = fs::File::open(self.full(path)).map_err(|e| FsError::Open {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(file))
    }

    fn create(&mut self, path: &str) -> Result<Box<dyn WriteStream + '_>> {
        let file = fs::File::create(self.full(path)).map_err(|e| FsError::Create {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(FlushOnCommit::new(file, path)))
    }

    fn mkdir_all(&mut self, path: &str) -> Result<()> {
        fs::create_dir_all(self.full(path)).map_err(|e| FsError::Mkdir {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    fn stat(&mut self, path: &str) -> Result<FileEntry> {
        let meta = fs::metadata(self.full(path)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FsError::NotFound {
                path: path.to_string(),
            },
            _ => FsError::Stat {
                path: path.to_string(),
                reason: e.to_string(),
            },
        })?;
        let rel = path.trim_start_matches('/');
        Ok(FileEntry {
            name: base_name(rel).to_string(),
            size: meta.len(),
            modified: modified_of(&meta),
            is_dir: meta.is_dir(),
            path: rel.to_string(),
        })
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        let full = self.full(path);
        let err = |reason: String| FsError::Remove {
            path: path.to_string(),
            reason,
        };
        if full.is_dir() {
            return Err(err("is a directory".to_string()));
        }
        fs::remove_file(full).map_err(|e| err(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn fs_in(dir: &tempfile::TempDir) -> LocalFs {
        let mut fs = LocalFs::new(dir.path().join("root"));
        fs.init().unwrap();
        fs
    }

    #[test]
    fn init_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a/b/c");
        LocalFs::new(&root).init().unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn list_reports_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = fs_in(&dir);
        fs.mkdir_all("sub").unwrap();
        std::fs::write(dir.path().join("root/top.txt"), b"12345").unwrap();
        std::fs::write(dir.path().join("root/sub/inner.csv"), b"x").unwrap();

        let mut top = fs.list("").unwrap();
        top.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "sub");
        assert!(top[0].is_dir);
        assert_eq!(top[1].path, "top.txt");
        assert_eq!(top[1].size, 5);

        let inner = fs.list("sub").unwrap();
        assert_eq!(inner[0].path, "sub/inner.csv");
    }

    #[test]
    fn list_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = fs_in(&dir);
        assert!(matches!(fs.list("nope"), Err(FsError::List { .. })));
    }

    #[test]
    fn create_then_open_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = fs_in(&dir);
        let mut w = fs.create("data.bin").unwrap();
        w.write_all(b"payload").unwrap();
        w.commit().unwrap();

        let mut buf = String::new();
        fs.open("data.bin").unwrap().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "payload");
    }

    #[test]
    fn stat_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = fs_in(&dir);
        assert!(fs.stat("ghost.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn stat_reports_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = fs_in(&dir);
        fs.mkdir_all("x/y").unwrap();
        std::fs::write(dir.path().join("root/x/y/f.txt"), b"abc").unwrap();
        let entry = fs.stat("x/y/f.txt").unwrap();
        assert_eq!(entry.name, "f.txt");
        assert_eq!(entry.path, "x/y/f.txt");
        assert_eq!(entry.size, 3);
        assert!(!entry.is_dir);
    }

    #[test]
    fn remove_rejects_directories_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = fs_in(&dir);
        fs.mkdir_all("d").unwrap();
        assert!(matches!(fs.remove("d"), Err(FsError::Remove { .. })));
        assert!(matches!(fs.remove("missing"), Err(FsError::Remove { .. })));

        std::fs::write(dir.path().join("root/f"), b"").unwrap();
        fs.remove("f").unwrap();
        assert!(!dir.path().join("root/f").exists());
    }
}
