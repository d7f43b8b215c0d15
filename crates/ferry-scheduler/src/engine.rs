use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ferry_core::TaskConfig;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::runner::TaskRunner;
use crate::schedule::{compute_next_run, parse_schedule};
use crate::types::{Schedule, TaskState};

const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Per-task serialization point. `gate` is held for the whole run; `queued`
/// marks a trigger already waiting on it.
struct TaskSlot {
    task: TaskConfig,
    gate: Mutex<()>,
    queued: AtomicBool,
}

struct Shared {
    runner: Arc<dyn TaskRunner>,
    slots: Vec<Arc<TaskSlot>>,
    states: DashMap<String, TaskState>,
    in_flight: watch::Sender<usize>,
    stopped: AtomicBool,
}

/// Counts a dispatched run from the moment it is accepted until its tokio
/// task finishes, whether it ran, was skipped after stop, or panicked.
struct InFlight(Arc<Shared>);

impl InFlight {
    fn enter(shared: &Arc<Shared>) -> Self {
        shared.in_flight.send_modify(|n| *n += 1);
        Self(Arc::clone(shared))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.send_modify(|n| *n -= 1);
    }
}

/// Marks a task `Running` for its lifetime and `Idle` again on drop, including
/// when the runner panics.
struct RunningState<'a> {
    shared: &'a Shared,
    name: &'a str,
}

impl<'a> RunningState<'a> {
    fn enter(shared: &'a Shared, name: &'a str) -> Self {
        shared.states.insert(name.to_string(), TaskState::Running);
        Self { shared, name }
    }
}

impl Drop for RunningState<'_> {
    fn drop(&mut self) {
        self.shared
            .states
            .insert(self.name.to_string(), TaskState::Idle);
    }
}

struct Trigger {
    slot: Arc<TaskSlot>,
    schedule: Schedule,
    next_run: Option<DateTime<Utc>>,
}

/// Fires every task once at start, then on its schedule, until stopped.
pub struct SchedulerEngine {
    tasks: Vec<TaskConfig>,
    runner: Arc<dyn TaskRunner>,
    tick: Duration,
}

impl SchedulerEngine {
    pub fn new(tasks: Vec<TaskConfig>, runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            tasks,
            runner,
            tick: DEFAULT_TICK,
        }
    }

    /// Override the driver's polling period (1 s by default).
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Register triggers, launch one immediate run per task and spawn the
    /// driver loop. Must be called from within a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let slots: Vec<Arc<TaskSlot>> = self
            .tasks
            .into_iter()
            .map(|task| {
                Arc::new(TaskSlot {
                    task,
                    gate: Mutex::new(()),
                    queued: AtomicBool::new(false),
                })
            })
            .collect();

        let states = DashMap::new();
        for slot in &slots {
            states.insert(slot.task.name.clone(), TaskState::Idle);
        }
        let (in_flight, _) = watch::channel(0usize);
        let shared = Arc::new(Shared {
            runner: self.runner,
            slots,
            states,
            in_flight,
            stopped: AtomicBool::new(false),
        });

        let now = Utc::now();
        let mut triggers = Vec::new();
        for slot in &shared.slots {
            match parse_schedule(&slot.task.cron) {
                Ok(schedule) => {
                    let next_run = compute_next_run(&schedule, now);
                    match next_run {
                        Some(at) => {
                            info!(task = %slot.task.name, cron = %slot.task.cron, next_run = %at, "task scheduled")
                        }
                        None => {
                            warn!(task = %slot.task.name, cron = %slot.task.cron, "schedule never fires; startup run only")
                        }
                    }
                    triggers.push(Trigger {
                        slot: Arc::clone(slot),
                        schedule,
                        next_run,
                    });
                }
                Err(e) => {
                    error!(task = %slot.task.name, error = %e, "no cron trigger registered");
                }
            }
        }

        for slot in &shared.slots {
            dispatch(&shared, slot);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let driver = tokio::spawn(drive(
            Arc::clone(&shared),
            triggers,
            self.tick,
            shutdown_rx,
        ));

        SchedulerHandle {
            shared,
            shutdown: shutdown_tx,
            driver,
        }
    }
}

/// Control surface for a started scheduler.
pub struct SchedulerHandle {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    driver: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop firing triggers. Runs already executing are left to finish;
    /// queued runs that have not started are dropped.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown.send(true);
        info!("scheduler stopped");
    }

    /// Resolves once no run is executing or queued.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Fire a task outside its schedule. Returns `false` for an unknown task
    /// or a stopped scheduler.
    pub fn trigger(&self, name: &str) -> bool {
        if self.shared.stopped.load(Ordering::Acquire) {
            return false;
        }
        match self.shared.slots.iter().find(|s| s.task.name == name) {
            Some(slot) => {
                dispatch(&self.shared, slot);
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.borrow()
    }

    pub fn task_state(&self, name: &str) -> Option<TaskState> {
        self.shared.states.get(name).map(|s| *s)
    }

    pub fn is_driver_finished(&self) -> bool {
        self.driver.is_finished()
    }
}

fn dispatch(shared: &Arc<Shared>, slot: &Arc<TaskSlot>) {
    if shared.stopped.load(Ordering::Acquire) {
        return;
    }
    if slot.queued.swap(true, Ordering::AcqRel) {
        debug!(task = %slot.task.name, "run already queued; trigger coalesced");
        return;
    }

    let guard = InFlight::enter(shared);
    let shared = Arc::clone(shared);
    let slot = Arc::clone(slot);
    tokio::spawn(async move {
        let _guard = guard;
        let _running = slot.gate.lock().await;
        slot.queued.store(false, Ordering::Release);
        if shared.stopped.load(Ordering::Acquire) {
            debug!(task = %slot.task.name, "scheduler stopped; queued run dropped");
            return;
        }

        let name = &slot.task.name;
        let _state = RunningState::enter(&shared, name);
        match shared.runner.run(&slot.task).await {
            Ok(()) => debug!(task = %name, "run complete"),
            Err(e) => error!(task = %name, error = %e, "run failed"),
        }
    });
}

/// Polls every `tick` until `shutdown` broadcasts `true`.
async fn drive(
    shared: Arc<Shared>,
    mut triggers: Vec<Trigger>,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(triggers = triggers.len(), "scheduler driver started");
    let mut interval = tokio::time::interval(tick);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                for trigger in triggers.iter_mut() {
                    let Some(due) = trigger.next_run else { continue };
                    if now < due {
                        continue;
                    }
                    dispatch(&shared, &trigger.slot);
                    trigger.next_run = compute_next_run(&trigger.schedule, now);
                    if trigger.next_run.is_none() {
                        warn!(task = %trigger.slot.task.name, "schedule has no further fire times");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("scheduler driver shutting down");
                    break;
                }
            }
        }
    }
}
