//! `ferry-transfer` — the traversal, copy and retention engine.
//!
//! A run walks the source depth-first. Each file passes three checks, in
//! this order:
//!
//! 1. the name filter;
//! 2. the staleness cutoff;
//! 3. the ledger.
//!
//! Files that pass are copied byte for byte. The ledger records only
//! completed copies. Afterwards, destination files whose ledger entry has
//! outlived `retention_days` are removed.

pub mod engine;
pub mod error;
pub mod filter;

pub use engine::{RunReport, TransferEngine};
pub use error::{Result, TransferError};
pub use filter::NameFilter;
