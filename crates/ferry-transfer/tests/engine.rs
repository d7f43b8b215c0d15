// End-to-end runs against local directories, with a spy around each backend
// so tests can see which files were opened and inject listing failures.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::{DateTime, Duration, TimeZone, Utc};
use ferry_core::{BackendKind, FixedClock, TaskConfig};
use ferry_fs::{Capabilities, Connector, FileEntry, FileSystem, FsError, FsSession, WriteStream};
use ferry_history::HistoryLedger;
use ferry_transfer::{TransferEngine, TransferError};

struct Spy {
    inner: FsSession,
    root: String,
    opens: Arc<Mutex<Vec<(String, String)>>>,
    fail_list: Vec<(String, String)>,
    closes: Arc<AtomicUsize>,
}

impl FileSystem for Spy {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }
    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }
    fn init(&mut self) -> ferry_fs::Result<()> {
        self.inner.init()
    }
    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close();
    }
    fn list(&mut self, path: &str) -> ferry_fs::Result<Vec<FileEntry>> {
        if self
            .fail_list
            .iter()
            .any(|(root, dir)| *root == self.root && dir == path)
        {
            return Err(FsError::List {
                path: path.to_string(),
                reason: "injected".into(),
            });
        }
        self.inner.list(path)
    }
    fn open(&mut self, path: &str) -> ferry_fs::Result<Box<dyn Read + Send + '_>> {
        self.opens
            .lock()
            .unwrap()
            .push((self.root.clone(), path.to_string()));
        self.inner.open(path)
    }
    fn create(&mut self, path: &str) -> ferry_fs::Result<Box<dyn WriteStream + '_>> {
        self.inner.create(path)
    }
    fn mkdir_all(&mut self, path: &str) -> ferry_fs::Result<()> {
        self.inner.mkdir_all(path)
    }
    fn stat(&mut self, path: &str) -> ferry_fs::Result<FileEntry> {
        self.inner.stat(path)
    }
    fn remove(&mut self, path: &str) -> ferry_fs::Result<()> {
        self.inner.remove(path)
    }
}

#[derive(Default)]
struct SpyConnector {
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    opens: Arc<Mutex<Vec<(String, String)>>>,
    fail_list: Mutex<Vec<(String, String)>>,
}

impl Connector for SpyConnector {
    fn connect(&self, endpoint: &ferry_core::Endpoint) -> ferry_fs::Result<FsSession> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let inner = ferry_fs::connect(endpoint)?;
        Ok(FsSession::new(Box::new(Spy {
            inner,
            root: endpoint.root.clone(),
            opens: Arc::clone(&self.opens),
            fail_list: self.fail_list.lock().unwrap().clone(),
            closes: Arc::clone(&self.closes),
        })))
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    src: PathBuf,
    dst: PathBuf,
    ledger_path: PathBuf,
    ledger: Arc<HistoryLedger>,
    clock: Arc<FixedClock>,
    spy: Arc<SpyConnector>,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        std::fs::create_dir_all(&src).unwrap();
        let ledger_path = dir.path().join("history.json");
        Self {
            ledger: Arc::new(HistoryLedger::new(&ledger_path)),
            ledger_path,
            clock: Arc::new(FixedClock::new(t0())),
            spy: Arc::new(SpyConnector::default()),
            src,
            dst,
            _dir: dir,
        }
    }

    fn engine(&self) -> TransferEngine {
        TransferEngine::new(Arc::clone(&self.ledger))
            .with_connector(self.spy.clone())
            .with_clock(self.clock.clone())
    }

    fn task(&self, regex: &str, newer_days: i64, retention_days: i64) -> TaskConfig {
        TaskConfig {
            name: "reports".into(),
            cron: "@hourly".into(),
            source_type: BackendKind::Local,
            source_path: self.src.to_string_lossy().into_owned(),
            source_regex: regex.into(),
            target_type: BackendKind::Local,
            target_path: self.dst.to_string_lossy().into_owned(),
            retention_days,
            source_newer_days: newer_days,
            source_auth: None,
            target_auth: None,
        }
    }

    fn write_src(&self, rel: &str, body: &str, modified: DateTime<Utc>) {
        let path = self.src.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        set_mtime(&path, modified);
    }

    fn src_opens(&self) -> Vec<String> {
        let root = self.src.to_string_lossy().into_owned();
        self.spy
            .opens
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == root)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn fail_listing(&self, dir: &str) {
        self.spy
            .fail_list
            .lock()
            .unwrap()
            .push((self.src.to_string_lossy().into_owned(), dir.to_string()));
    }

    fn history_has(&self, rel: &str) -> bool {
        self.ledger.task_history("reports").contains(rel)
    }
}

fn set_mtime(path: &Path, at: DateTime<Utc>) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::from(at)).unwrap();
}

#[test]
fn example_scenario() {
    let fx = Fixture::new();
    fx.write_src("a.csv", "id,value\n1,2\n", t0() - Duration::hours(1));
    fx.write_src("b.txt", "notes", t0() - Duration::hours(1));
    let engine = fx.engine();

    // First run: only the csv moves.
    let report = engine.run_task(&fx.task(r"^.*\.csv$", 0, 0)).unwrap();
    assert_eq!(report.transferred, 1);
    assert_eq!(report.skipped_filter, 1);
    assert_eq!(
        std::fs::read_to_string(fx.dst.join("a.csv")).unwrap(),
        "id,value\n1,2\n"
    );
    assert!(!fx.dst.join("b.txt").exists());
    assert!(fx.history_has("a.csv"));
    assert_eq!(fx.src_opens(), vec!["a.csv"]);

    // Second run: nothing new.
    let report = engine.run_task(&fx.task(r"^.*\.csv$", 0, 0)).unwrap();
    assert_eq!(report.transferred, 0);
    assert_eq!(report.skipped_duplicate, 1);
    assert_eq!(fx.src_opens(), vec!["a.csv"]);

    // Two days later with a one-day retention: purged, but still in the ledger.
    fx.clock.advance(Duration::days(2));
    let report = engine.run_task(&fx.task(r"^.*\.csv$", 0, 1)).unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.transferred, 0);
    assert!(!fx.dst.join("a.csv").exists());
    assert!(fx.history_has("a.csv"));

    // And it is never sent again.
    let report = engine.run_task(&fx.task(r"^.*\.csv$", 0, 1)).unwrap();
    assert_eq!(report.transferred, 0);
    assert!(!fx.dst.join("a.csv").exists());
    assert_eq!(fx.src_opens(), vec!["a.csv"]);
}

#[test]
fn second_run_is_idempotent() {
    let fx = Fixture::new();
    for i in 0..5 {
        fx.write_src(&format!("f{i}.dat"), "x", t0());
    }
    fx.write_src("sub/deep/g.dat", "y", t0());
    let engine = fx.engine();

    assert_eq!(engine.run_task(&fx.task("", 0, 0)).unwrap().transferred, 6);
    let again = engine.run_task(&fx.task("", 0, 0)).unwrap();
    assert_eq!(again.transferred, 0);
    assert_eq!(again.skipped_duplicate, 6);
}

#[test]
fn ledgered_file_is_never_reopened_even_if_changed() {
    let fx = Fixture::new();
    fx.write_src("a.csv", "v1", t0());
    let engine = fx.engine();
    engine.run_task(&fx.task("", 0, 0)).unwrap();

    fx.write_src("a.csv", "v2 with different size", t0() + Duration::minutes(5));
    engine.run_task(&fx.task("", 0, 0)).unwrap();

    assert_eq!(fx.src_opens(), vec!["a.csv"]);
    assert_eq!(std::fs::read_to_string(fx.dst.join("a.csv")).unwrap(), "v1");
}

#[test]
fn regex_matches_base_name_only() {
    let fx = Fixture::new();
    fx.write_src("in/report_1.csv", "1", t0());
    fx.write_src("in/other.csv", "2", t0());
    let engine = fx.engine();

    // A pattern that only matches the relative path never fires.
    let report = engine.run_task(&fx.task(r"in/.*", 0, 0)).unwrap();
    assert_eq!(report.transferred, 0);

    let report = engine.run_task(&fx.task(r"report_\d+\.csv", 0, 0)).unwrap();
    assert_eq!(report.transferred, 1);
    assert!(fx.dst.join("in/report_1.csv").exists());
    assert!(!fx.dst.join("in/other.csv").exists());
}

#[test]
fn non_matching_file_skipped_even_when_fresh() {
    let fx = Fixture::new();
    fx.write_src("fresh.txt", "x", t0());
    let report = fx.engine().run_task(&fx.task(r".*\.csv", 7, 0)).unwrap();
    assert_eq!(report.transferred, 0);
    assert_eq!(report.skipped_filter, 1);
    assert!(fx.src_opens().is_empty());
}

#[test]
fn staleness_cutoff_boundary() {
    let fx = Fixture::new();
    let cutoff = t0() - Duration::days(3);
    fx.write_src("at_cutoff.csv", "a", cutoff);
    fx.write_src("just_before.csv", "b", cutoff - Duration::seconds(1));
    fx.write_src("recent.csv", "c", t0() - Duration::hours(2));

    let report = fx.engine().run_task(&fx.task("", 3, 0)).unwrap();
    assert_eq!(report.transferred, 2);
    assert_eq!(report.skipped_stale, 1);
    // Exactly at the cutoff counts as recent enough.
    assert!(fx.dst.join("at_cutoff.csv").exists());
    assert!(fx.dst.join("recent.csv").exists());
    assert!(!fx.dst.join("just_before.csv").exists());
}

#[test]
fn staleness_filter_disabled_when_zero() {
    let fx = Fixture::new();
    fx.write_src("ancient.csv", "a", t0() - Duration::days(3650));
    let report = fx.engine().run_task(&fx.task("", 0, 0)).unwrap();
    assert_eq!(report.transferred, 1);
}

#[test]
fn nested_directories_are_recreated() {
    let fx = Fixture::new();
    fx.write_src("2024/06/10/a.csv", "deep", t0());
    fx.engine().run_task(&fx.task("", 0, 0)).unwrap();
    assert_eq!(
        std::fs::read_to_string(fx.dst.join("2024/06/10/a.csv")).unwrap(),
        "deep"
    );
    assert!(fx.history_has("2024/06/10/a.csv"));
}

#[test]
fn failing_subdirectory_does_not_stop_siblings() {
    let fx = Fixture::new();
    fx.write_src("bad/x.csv", "x", t0());
    fx.write_src("good/y.csv", "y", t0());
    fx.write_src("top.csv", "t", t0());
    fx.fail_listing("bad");

    let report = fx.engine().run_task(&fx.task("", 0, 0)).unwrap();
    assert_eq!(report.list_errors, 1);
    assert_eq!(report.transferred, 2);
    assert!(fx.dst.join("good/y.csv").exists());
    assert!(fx.dst.join("top.csv").exists());
    assert!(!fx.history_has("bad/x.csv"));
}

#[test]
fn failing_root_listing_still_runs_cleanup_and_saves() {
    let fx = Fixture::new();
    std::fs::create_dir_all(&fx.dst).unwrap();
    std::fs::write(fx.dst.join("old.csv"), "o").unwrap();
    fx.ledger
        .task_history("reports")
        .record("old.csv", t0() - Duration::days(10));
    fx.fail_listing("");

    let report = fx.engine().run_task(&fx.task("", 0, 5)).unwrap();
    assert_eq!(report.list_errors, 1);
    assert_eq!(report.removed, 1);
    assert!(fx.ledger_path.exists());
}

#[test]
fn failed_copy_is_retried_next_run() {
    let fx = Fixture::new();
    fx.write_src("a.csv", "payload", t0());
    // A directory squatting on the destination name makes create fail.
    std::fs::create_dir_all(fx.dst.join("a.csv")).unwrap();
    let engine = fx.engine();

    let report = engine.run_task(&fx.task("", 0, 0)).unwrap();
    assert_eq!(report.failed, 1);
    assert!(!fx.history_has("a.csv"));

    std::fs::remove_dir(fx.dst.join("a.csv")).unwrap();
    let report = engine.run_task(&fx.task("", 0, 0)).unwrap();
    assert_eq!(report.transferred, 1);
    assert!(fx.history_has("a.csv"));
}

#[test]
fn invalid_regex_aborts_before_any_io() {
    let fx = Fixture::new();
    fx.write_src("a.csv", "x", t0());
    let err = fx.engine().run_task(&fx.task("([bad", 0, 0)).unwrap_err();
    assert!(matches!(err, TransferError::Config { .. }));
    assert_eq!(fx.spy.connects.load(Ordering::SeqCst), 0);
    assert!(!fx.dst.exists());
}

#[test]
fn target_connection_failure_releases_source() {
    let fx = Fixture::new();
    fx.write_src("a.csv", "x", t0());
    let mut task = fx.task("", 0, 0);
    task.target_type = BackendKind::Sftp;

    let err = fx.engine().run_task(&task).unwrap_err();
    assert!(matches!(
        err,
        TransferError::Connection {
            side: "target",
            source: FsError::MissingAuth { .. }
        }
    ));
    assert_eq!(fx.spy.closes.load(Ordering::SeqCst), 1);
    assert!(fx.src_opens().is_empty());
}

#[test]
fn sessions_closed_after_successful_run() {
    let fx = Fixture::new();
    fx.write_src("a.csv", "x", t0());
    fx.engine().run_task(&fx.task("", 0, 0)).unwrap();
    assert_eq!(fx.spy.connects.load(Ordering::SeqCst), 2);
    assert_eq!(fx.spy.closes.load(Ordering::SeqCst), 2);
}

#[test]
fn cleanup_of_already_absent_destination_keeps_entry() {
    let fx = Fixture::new();
    fx.ledger
        .task_history("reports")
        .record("ghost.csv", t0() - Duration::days(30));

    let report = fx.engine().run_task(&fx.task("", 0, 7)).unwrap();
    assert_eq!(report.removed, 0);
    assert_eq!(report.cleanup_errors, 0);
    assert!(fx.history_has("ghost.csv"));
}

#[test]
fn retention_boundary_is_kept() {
    let fx = Fixture::new();
    std::fs::create_dir_all(&fx.dst).unwrap();
    for name in ["at_cutoff.csv", "expired.csv", "young.csv"] {
        std::fs::write(fx.dst.join(name), name).unwrap();
    }
    let h = fx.ledger.task_history("reports");
    h.record("at_cutoff.csv", t0() - Duration::days(2));
    h.record("expired.csv", t0() - Duration::days(2) - Duration::seconds(1));
    h.record("young.csv", t0() - Duration::hours(1));

    let report = fx.engine().run_task(&fx.task("", 0, 2)).unwrap();
    assert_eq!(report.removed, 1);
    assert!(fx.dst.join("at_cutoff.csv").exists());
    assert!(fx.dst.join("young.csv").exists());
    assert!(!fx.dst.join("expired.csv").exists());
    assert_eq!(h.len(), 3);
}

#[test]
fn ledger_is_persisted_after_run() {
    let fx = Fixture::new();
    fx.write_src("a.csv", "x", t0());
    fx.engine().run_task(&fx.task("", 0, 0)).unwrap();

    let reloaded = HistoryLedger::new(&fx.ledger_path);
    reloaded.load().unwrap();
    assert_eq!(
        reloaded.task_history("reports").transferred_at("a.csv"),
        Some(t0())
    );
}

#[test]
fn out_of_range_day_windows_disable_filters() {
    let fx = Fixture::new();
    fx.write_src("old.csv", "x", t0() - Duration::days(3650));
    std::fs::create_dir_all(&fx.dst).unwrap();
    std::fs::write(fx.dst.join("kept.csv"), "k").unwrap();
    fx.ledger
        .task_history("reports")
        .record("kept.csv", t0() - Duration::days(3650));

    let report = fx
        .engine()
        .run_task(&fx.task("", 200_000_000_000, 100_000_000))
        .unwrap();
    assert_eq!(report.transferred, 1);
    assert_eq!(report.skipped_stale, 0);
    assert_eq!(report.removed, 0);
    assert!(fx.dst.join("kept.csv").exists());

    let reloaded = HistoryLedger::new(&fx.ledger_path);
    reloaded.load().unwrap();
    assert!(reloaded.task_history("reports").contains("old.csv"));
}
