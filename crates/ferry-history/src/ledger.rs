use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LedgerError, Result};

/// Paths one task has already delivered, with the time of the last
/// successful transfer.
///
/// Only files that completed a full byte copy are recorded. Presence alone
/// means "do not send again"; size and mtime are never compared.
#[derive(Debug, Default)]
pub struct TaskHistory {
    records: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl TaskHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.records
            .read()
            .expect("task history poisoned")
            .contains_key(path)
    }

    pub fn record(&self, path: &str, at: DateTime<Utc>) {
        self.records
            .write()
            .expect("task history poisoned")
            .insert(path.to_string(), at);
    }

    pub fn transferred_at(&self, path: &str) -> Option<DateTime<Utc>> {
        self.records
            .read()
            .expect("task history poisoned")
            .get(path)
            .copied()
    }

    /// Forget a path so the next run transfers it again.
    pub fn remove(&self, path: &str) -> Option<DateTime<Utc>> {
        self.records
            .write()
            .expect("task history poisoned")
            .remove(path)
    }

    /// Point-in-time copy, so callers can do I/O without holding the lock.
    pub fn snapshot(&self) -> HashMap<String, DateTime<Utc>> {
        self.records.read().expect("task history poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("task history poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn replace(&self, records: HashMap<String, DateTime<Utc>>) {
        *self.records.write().expect("task history poisoned") = records;
    }
}

// On-disk shape: { "<task>": { "records": { "<path>": "<rfc3339>" } } }
#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskHistoryFile {
    #[serde(default)]
    records: Option<BTreeMap<String, DateTime<Utc>>>,
}

type LedgerFile = BTreeMap<String, TaskHistoryFile>;

/// Transfer history for every task, persisted as one JSON file.
///
/// The task map and each `TaskHistory` are locked independently. That keeps
/// memory consistent under concurrent runs; it does not make a save atomic
/// across tasks. Saves are serialized, and each one writes the full
/// in-memory state as of that moment.
pub struct HistoryLedger {
    path: PathBuf,
    tasks: RwLock<HashMap<String, Arc<TaskHistory>>>,
    save_lock: Mutex<()>,
}

impl HistoryLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tasks: RwLock::new(HashMap::new()),
            save_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the backing file. A missing file is a first run, not an error.
    ///
    /// Histories already handed out keep their identity; their contents are
    /// replaced by what was on disk.
    pub fn load(&self) -> Result<()> {
        let data = match std::fs::read(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no ledger on disk, starting empty");
                return Ok(());
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.path.display().to_string(),
                    source,
                })
            }
        };
        let file: LedgerFile = serde_json::from_slice(&data)?;

        let mut tasks = self.tasks.write().expect("ledger poisoned");
        let mut total = 0usize;
        for (name, history) in file {
            let records: HashMap<_, _> = history.records.unwrap_or_default().into_iter().collect();
            total += records.len();
            tasks
                .entry(name)
                .or_insert_with(|| Arc::new(TaskHistory::new()))
                .replace(records);
        }
        info!(path = %self.path.display(), tasks = tasks.len(), records = total, "ledger loaded");
        Ok(())
    }

    /// Overwrite the backing file with the whole ledger.
    ///
    /// Written to a sibling temp file first and renamed into place, so a
    /// crash mid-write leaves the previous ledger intact. In-memory state is
    /// never rolled back on failure.
    pub fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().expect("ledger save lock poisoned");

        let file: LedgerFile = {
            let tasks = self.tasks.read().expect("ledger poisoned");
            tasks
                .iter()
                .map(|(name, history)| {
                    let records = history.snapshot().into_iter().collect();
                    (
                        name.clone(),
                        TaskHistoryFile {
                            records: Some(records),
                        },
                    )
                })
                .collect()
        };
        let json = serde_json::to_vec_pretty(&file)?;

        let io_err = |source| LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        std::fs::write(&tmp, &json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;

        debug!(path = %self.path.display(), tasks = file.len(), "ledger saved");
        Ok(())
    }

    /// History for `name`, created and registered on first access so every
    /// caller shares the same instance.
    pub fn task_history(&self, name: &str) -> Arc<TaskHistory> {
        if let Some(existing) = self.tasks.read().expect("ledger poisoned").get(name) {
            return Arc::clone(existing);
        }
        let mut tasks = self.tasks.write().expect("ledger poisoned");
        Arc::clone(
            tasks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(TaskHistory::new())),
        )
    }

    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .tasks
            .read()
            .expect("ledger poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
