use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ferry_core::{Clock, SystemClock, TaskConfig};
use ferry_fs::path::{join_rel, parent_rel};
use ferry_fs::{BackendConnector, Connector, FileSystem, FsError};
use ferry_history::{HistoryLedger, TaskHistory};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::{Result, TransferError};
use crate::filter::{cutoff, NameFilter};

/// Counters for one task run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub transferred: usize,
    pub bytes: u64,
    pub failed: usize,
    pub skipped_filter: usize,
    pub skipped_stale: usize,
    pub skipped_duplicate: usize,
    pub list_errors: usize,
    pub removed: usize,
    pub cleanup_errors: usize,
}

/// Walks a task's source, copies what the filters and ledger allow, then
/// purges expired files from the destination.
///
/// Stateless apart from its collaborators; one engine serves every task.
pub struct TransferEngine {
    ledger: Arc<HistoryLedger>,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
}

impl TransferEngine {
    pub fn new(ledger: Arc<HistoryLedger>) -> Self {
        Self {
            ledger,
            connector: Arc::new(BackendConnector),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ledger(&self) -> &Arc<HistoryLedger> {
        &self.ledger
    }

    /// Run one task end to end. Blocking.
    ///
    /// Only a bad filter or an unreachable endpoint fails the run; everything
    /// else is logged and counted in the report. Both sessions are closed on
    /// every exit path and the ledger is saved once traversal has started.
    pub fn run_task(&self, task: &TaskConfig) -> Result<RunReport> {
        let span = info_span!("task", task = %task.name, run = %Uuid::new_v4());
        let _enter = span.enter();
        info!("starting task");

        let filter = NameFilter::compile(&task.source_regex)?;

        let mut src = self
            .connector
            .connect(&task.source())
            .map_err(|source| TransferError::Connection {
                side: "source",
                source,
            })?;
        let mut dst = self
            .connector
            .connect(&task.target())
            .map_err(|source| TransferError::Connection {
                side: "target",
                source,
            })?;

        let history = self.ledger.task_history(&task.name);
        let now = self.clock.now();
        let mut walk = Walk {
            filter: &filter,
            stale_before: cutoff(now, task.source_newer_days),
            history: &history,
            clock: self.clock.as_ref(),
            report: RunReport::default(),
        };

        if let Err(e) = walk.dir(&mut *src, &mut *dst, "") {
            warn!(error = %e, "cannot list source root");
            walk.report.list_errors += 1;
        }
        let mut report = walk.report;

        if let Some(expire_before) = cutoff(now, task.retention_days) {
            cleanup(&mut *dst, &history, expire_before, &mut report);
        }

        if let Err(e) = self.ledger.save() {
            warn!(error = %e, "ledger save failed");
        }

        info!(
            transferred = report.transferred,
            bytes = report.bytes,
            failed = report.failed,
            skipped_filter = report.skipped_filter,
            skipped_stale = report.skipped_stale,
            skipped_duplicate = report.skipped_duplicate,
            list_errors = report.list_errors,
            removed = report.removed,
            "finished task"
        );
        Ok(report)
    }
}

struct Walk<'a> {
    filter: &'a NameFilter,
    stale_before: Option<DateTime<Utc>>,
    history: &'a TaskHistory,
    clock: &'a dyn Clock,
    report: RunReport,
}

impl Walk<'_> {
    /// Depth-first, in listing order. A subdirectory that fails to list is
    /// logged and skipped; its siblings carry on.
    fn dir(
        &mut self,
        src: &mut dyn FileSystem,
        dst: &mut dyn FileSystem,
        dir: &str,
    ) -> std::result::Result<(), FsError> {
        for entry in src.list(dir)? {
            let rel = join_rel(dir, &entry.name);

            if entry.is_dir {
                if let Err(e) = self.dir(src, dst, &rel) {
                    warn!(path = %rel, error = %e, "skipping subdirectory");
                    self.report.list_errors += 1;
                }
                continue;
            }

            if !self.filter.matches(&entry.name) {
                debug!(path = %rel, "skip: name does not match filter");
                self.report.skipped_filter += 1;
                continue;
            }
            if self.stale_before.is_some_and(|c| entry.modified < c) {
                debug!(path = %rel, modified = %entry.modified, "skip: older than source_newer_days");
                self.report.skipped_stale += 1;
                continue;
            }
            if self.history.contains(&rel) {
                debug!(path = %rel, "skip: already transferred");
                self.report.skipped_duplicate += 1;
                continue;
            }

            match copy_file(src, dst, &rel) {
                Ok(bytes) => {
                    self.history.record(&rel, self.clock.now());
                    self.report.transferred += 1;
                    self.report.bytes += bytes;
                    info!(path = %rel, bytes, "transferred");
                }
                Err(e) => {
                    // No ledger entry, so the next run retries it.
                    warn!(path = %rel, error = %e, "transfer failed");
                    self.report.failed += 1;
                }
            }
        }
        Ok(())
    }
}

fn copy_file(
    src: &mut dyn FileSystem,
    dst: &mut dyn FileSystem,
    rel: &str,
) -> std::result::Result<u64, FsError> {
    if let Some(parent) = parent_rel(rel) {
        dst.mkdir_all(parent)?;
    }
    let mut reader = src.open(rel)?;
    let mut writer = dst.create(rel)?;
    let bytes = io::copy(&mut reader, &mut writer).map_err(|e| FsError::Write {
        path: rel.to_string(),
        reason: e.to_string(),
    })?;
    writer.commit()?;
    Ok(bytes)
}

/// Delete destination files whose ledger entry is older than `expire_before`.
///
/// Ledger entries are left in place, so a purged file is never sent again.
fn cleanup(
    dst: &mut dyn FileSystem,
    history: &TaskHistory,
    expire_before: DateTime<Utc>,
    report: &mut RunReport,
) {
    let mut expired: Vec<_> = history
        .snapshot()
        .into_iter()
        .filter(|(_, at)| *at < expire_before)
        .collect();
    expired.sort();

    for (path, transferred_at) in expired {
        if let Err(e) = dst.stat(&path) {
            debug!(%path, error = %e, "cleanup: destination already gone");
            continue;
        }
        match dst.remove(&path) {
            Ok(()) => {
                info!(%path, %transferred_at, "cleanup: removed expired file");
                report.removed += 1;
            }
            Err(e) => {
                warn!(%path, error = %e, "cleanup: remove failed");
                report.cleanup_errors += 1;
            }
        }
    }
}
