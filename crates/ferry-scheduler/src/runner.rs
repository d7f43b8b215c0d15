use std::sync::Arc;

use async_trait::async_trait;
use ferry_core::TaskConfig;
use ferry_transfer::TransferEngine;

use crate::error::{Result, SchedulerError};

/// Executes one run of a task. The scheduler guarantees a runner is never
/// invoked concurrently for the same task.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &TaskConfig) -> Result<()>;
}

/// Runs tasks through the blocking [`TransferEngine`] on tokio's blocking pool.
pub struct TransferRunner {
    engine: Arc<TransferEngine>,
}

impl TransferRunner {
    pub fn new(engine: Arc<TransferEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskRunner for TransferRunner {
    async fn run(&self, task: &TaskConfig) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let owned = task.clone();
        let outcome = tokio::task::spawn_blocking(move || engine.run_task(&owned))
            .await
            .map_err(|e| SchedulerError::TaskFailed {
                task: task.name.clone(),
                reason: format!("run aborted: {e}"),
            })?;
        outcome.map(|_| ()).map_err(|e| SchedulerError::TaskFailed {
            task: task.name.clone(),
            reason: format!("[{}] {e}", e.code()),
        })
    }
}
