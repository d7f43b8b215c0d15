use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tracing::warn;

use crate::error::{Result, TransferError};

/// Filename filter: a full, case-sensitive match against the base name.
/// An empty pattern accepts everything.
#[derive(Debug, Clone)]
pub struct NameFilter {
    regex: Option<Regex>,
}

impl NameFilter {
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Ok(Self { regex: None });
        }
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| TransferError::Config {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { regex: Some(regex) })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.as_ref().map_or(true, |r| r.is_match(name))
    }
}

/// `now - days`, or `None` when the window is disabled (`days <= 0`).
///
/// A window reaching past the representable calendar is also `None`: every
/// file counts as newer and nothing expires.
pub fn cutoff(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    if days <= 0 {
        return None;
    }
    let cutoff = Duration::try_days(days).and_then(|window| now.checked_sub_signed(window));
    if cutoff.is_none() {
        warn!(days, "day window out of range, treating it as unbounded");
    }
    cutoff
}
