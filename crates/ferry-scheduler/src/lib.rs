//! `ferry-scheduler` — fires sync tasks on their cron schedules.
//!
//! # Overview
//!
//! [`engine::SchedulerEngine::start`] runs every task once straight away, then
//! polls once a second and dispatches each task whose next fire time has
//! arrived. Runs of one task are serialized: a trigger that lands while the
//! task is running queues a single follow-up run and further triggers are
//! coalesced into it. Different tasks run in parallel.
//!
//! # Schedule forms
//!
//! | Form                         | Behaviour                                   |
//! |------------------------------|---------------------------------------------|
//! | `*/5 * * * *`                | Standard five-field cron, minute precision  |
//! | `0 */5 * * * *`              | Six/seven-field cron with seconds (and year) |
//! | `@daily`, `@hourly`, ...     | Descriptor shorthands                       |
//! | `@every 90s`, `@every 1h30m` | Fixed interval from the previous fire time  |

pub mod engine;
pub mod error;
pub mod runner;
pub mod schedule;
pub mod types;

pub use engine::{SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use runner::{TaskRunner, TransferRunner};
pub use schedule::{compute_next_run, parse_schedule};
pub use types::{Schedule, TaskState};
