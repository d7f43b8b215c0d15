use std::ops::{Deref, DerefMut};

use ferry_core::{BackendKind, Endpoint};
use tracing::debug;

use crate::error::{FsError, Result};
use crate::ftp::FtpFs;
use crate::local::LocalFs;
use crate::sftp::SftpFs;
use crate::types::FileSystem;

/// Owns a connected backend for the length of one task run and closes it on
/// drop, whichever way the run ends.
pub struct FsSession {
    inner: Box<dyn FileSystem>,
}

impl FsSession {
    pub fn new(inner: Box<dyn FileSystem>) -> Self {
        Self { inner }
    }
}

impl Deref for FsSession {
    type Target = dyn FileSystem;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl DerefMut for FsSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.inner
    }
}

impl Drop for FsSession {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// Build the backend for `endpoint` without connecting it.
pub fn build(endpoint: &Endpoint) -> Result<Box<dyn FileSystem>> {
    let kind = endpoint.kind;
    if kind == BackendKind::Local {
        return Ok(Box::new(LocalFs::new(&endpoint.root)));
    }

    let auth = endpoint
        .auth
        .as_ref()
        .ok_or(FsError::MissingAuth { kind })?;
    let addr = auth.address(kind);
    let (user, password, root) = (
        auth.user.clone(),
        auth.password.clone(),
        endpoint.root.clone(),
    );
    Ok(match kind {
        BackendKind::Sftp => Box::new(SftpFs::new(addr, user, password, root)),
        _ => Box::new(FtpFs::new(addr, user, password, root)),
    })
}

/// Build and initialise the backend for `endpoint`.
///
/// A failed `init` still closes whatever was half-opened.
pub fn connect(endpoint: &Endpoint) -> Result<FsSession> {
    let mut session = FsSession::new(build(endpoint)?);
    session.init()?;
    let caps = session.capabilities();
    debug!(
        kind = %endpoint.kind,
        root = %endpoint.root,
        native_stat = caps.native_stat,
        native_mkdir_all = caps.native_mkdir_all,
        "filesystem ready"
    );
    Ok(session)
}

/// Factory seam used by the transfer engine to open both sides of a task.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &Endpoint) -> Result<FsSession>;
}

/// Dispatches on the endpoint's backend kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackendConnector;

impl Connector for BackendConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<FsSession> {
        connect(endpoint)
    }
}
