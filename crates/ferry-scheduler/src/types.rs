/// Defines when a task fires after its immediate startup run.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Repeat every N seconds (`@every 90s`, `@every 1h30m`).
    Interval { every_secs: u64 },

    /// Calendar cron expression, normalised to the six/seven-field form.
    Cron {
        expression: String,
        parsed: Box<cron::Schedule>,
    },
}

/// Per-task run state. There is no failed state: a failed run is logged and
/// the task goes back to idle, eligible for its next trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Idle => "idle",
            TaskState::Running => "running",
        };
        write!(f, "{s}")
    }
}
