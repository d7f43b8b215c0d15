//! `ferry-core` — task descriptors, config loading and the shared clock.

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Auth, BackendKind, Endpoint, SyncConfig, TaskConfig};
pub use error::{ConfigError, Result};
