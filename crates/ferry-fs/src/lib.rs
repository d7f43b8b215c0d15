//! `ferry-fs` — one filesystem capability surface over local disk, SFTP and FTP.
//!
//! # Backends
//!
//! | Kind    | Session                 | `stat`          | `mkdir_all`                 |
//! |---------|-------------------------|-----------------|-----------------------------|
//! | `local` | none                    | O(1)            | native                      |
//! | `sftp`  | ssh2, password auth     | O(1)            | per level, verified         |
//! | `ftp`   | suppaftp, binary mode   | O(siblings)     | one MKD per level, advisory |
//!
//! Every operation is blocking. Callers in async code run them on the
//! blocking pool.

pub mod error;
pub mod ftp;
pub mod local;
pub mod path;
pub mod session;
pub mod sftp;
pub mod types;

pub use error::{FsError, Result};
pub use session::{build, connect, BackendConnector, Connector, FsSession};
pub use types::{Capabilities, FileEntry, FileSystem, WriteStream};
