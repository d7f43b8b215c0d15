//! `ferry-history` — the per-task transfer ledger.
//!
//! One JSON file maps task name → relative path → time of the last
//! successful transfer. It is loaded once at startup and rewritten
//! wholesale after every task run and at shutdown.

pub mod error;
pub mod ledger;

pub use error::{LedgerError, Result};
pub use ledger::{HistoryLedger, TaskHistory};
