use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, SchedulerError};
use crate::types::Schedule;

/// Parse a task's `cron` string.
///
/// Accepted forms:
/// - five-field standard cron (`*/5 * * * *`), minute precision, Sunday = 0 or 7
/// - six/seven-field cron with seconds (and year)
/// - `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`, `@midnight`, `@hourly`
/// - `@every <n>{s|m|h|d}...`, e.g. `@every 90s`, `@every 1h30m`
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let expr = expr.trim();
    let invalid = |reason: String| SchedulerError::InvalidSchedule {
        expression: expr.to_string(),
        reason,
    };

    if let Some(rest) = expr.strip_prefix("@every") {
        let every_secs = parse_every(rest.trim()).map_err(invalid)?;
        return Ok(Schedule::Interval { every_secs });
    }

    let normalised = match expr {
        "@yearly" | "@annually" => "0 0 0 1 1 *".to_string(),
        "@monthly" => "0 0 0 1 * *".to_string(),
        "@weekly" => "0 0 0 * * Sun".to_string(),
        "@daily" | "@midnight" => "0 0 0 * * *".to_string(),
        "@hourly" => "0 0 * * * *".to_string(),
        _ => {
            let fields: Vec<&str> = expr.split_whitespace().collect();
            match fields.len() {
                // Standard cron has no seconds field and counts weekdays from
                // Sunday = 0; the parser wants seconds and Sunday = 1.
                5 => format!(
                    "0 {} {} {} {} {}",
                    fields[0],
                    fields[1],
                    fields[2],
                    fields[3],
                    translate_weekdays(fields[4])
                ),
                6 | 7 => fields.join(" "),
                n => return Err(invalid(format!("expected 5-7 fields, got {n}"))),
            }
        }
    };

    let parsed = cron::Schedule::from_str(&normalised).map_err(|e| invalid(e.to_string()))?;
    Ok(Schedule::Cron {
        expression: normalised,
        parsed: Box::new(parsed),
    })
}

/// Compute the next UTC execution time for `schedule` strictly after `from`.
///
/// `None` when the schedule has no later fire time the calendar can represent.
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Interval { every_secs } => i64::try_from(*every_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|every| from.checked_add_signed(every)),
        Schedule::Cron { parsed, .. } => parsed.after(&from).next(),
    }
}

fn parse_every(duration: &str) -> std::result::Result<u64, String> {
    if duration.is_empty() {
        return Err("missing duration after @every".into());
    }
    let mut total = 0u64;
    let mut digits = String::new();
    for c in duration.chars().filter(|c| !c.is_whitespace()) {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("expected a number before '{c}'"))?;
        digits.clear();
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            other => return Err(format!("unknown duration unit '{other}'")),
        };
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| "interval too large".to_string())?;
    }
    if !digits.is_empty() {
        return Err(format!("missing unit after {digits}"));
    }
    if total == 0 {
        return Err("interval must be positive".into());
    }
    if i64::try_from(total).ok().and_then(Duration::try_seconds).is_none() {
        return Err("interval too large".into());
    }
    Ok(total)
}

/// Shift numeric weekdays from standard cron (0-7, Sunday = 0 or 7) to the
/// parser's 1-7 with Sunday = 1. Names and `*` pass through.
fn translate_weekdays(field: &str) -> String {
    fn shift(n: u32) -> u32 {
        n % 7 + 1
    }

    fn numeric_range(range: &str) -> Option<(u32, u32)> {
        let (a, b) = range.split_once('-')?;
        Some((a.parse().ok()?, b.parse().ok()?))
    }

    field
        .split(',')
        .map(|item| {
            let (range, step) = match item.split_once('/') {
                Some((r, s)) => (r, Some(s)),
                None => (item, None),
            };
            let translated = match numeric_range(range) {
                Some((a, b)) => {
                    // A stepped range can wrap past Sunday = 7, so list its days.
                    let every = step
                        .and_then(|s| s.parse::<usize>().ok())
                        .filter(|n| *n > 0);
                    if let Some(n) = every {
                        let mut days: Vec<u32> = (a..=b).step_by(n).map(shift).collect();
                        days.sort_unstable();
                        days.dedup();
                        return days
                            .iter()
                            .map(u32::to_string)
                            .collect::<Vec<_>>()
                            .join(",");
                    }
                    match (a, b) {
                        (0, 7) => "1-7".to_string(),
                        // Sunday as 7 closes the week; split it out to Sunday = 1.
                        (a, 7) => format!("{}-7,1", shift(a)),
                        (a, b) => format!("{}-{}", shift(a), shift(b)),
                    }
                }
                None => match range.parse::<u32>() {
                    Ok(n) => shift(n).to_string(),
                    Err(_) => range.to_string(),
                },
            };
            match step {
                Some(s) => format!("{translated}/{s}"),
                None => translated,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
