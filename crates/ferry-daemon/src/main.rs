use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ferry_core::SyncConfig;
use ferry_history::HistoryLedger;
use ferry_scheduler::{SchedulerEngine, TransferRunner};
use ferry_transfer::TransferEngine;
use tracing::{info, warn};

mod args;
mod signal;

use args::Args;

/// How long shutdown waits for running tasks before saving and exiting.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry=info".into()),
        )
        .init();

    let args = Args::parse();

    // config path: --config > FERRY_CONFIG > ./config.toml
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("FERRY_CONFIG").ok());
    let config = SyncConfig::load(config_path.as_deref())?;

    let history_path = args
        .history
        .clone()
        .unwrap_or_else(|| config.history.path.clone());
    let ledger = Arc::new(HistoryLedger::new(&history_path));
    if let Err(e) = ledger.load() {
        warn!(path = %history_path, error = %e, "history unreadable, starting empty");
    }
    info!(path = %history_path, tasks = ledger.task_names().len(), "history loaded");

    let engine = Arc::new(TransferEngine::new(Arc::clone(&ledger)));
    let runner = Arc::new(TransferRunner::new(engine));
    let task_count = config.tasks.len();
    let scheduler = SchedulerEngine::new(config.tasks, runner).start();
    info!(tasks = task_count, "ferry running");

    signal::wait_for_shutdown().await;
    info!("shutdown requested");

    scheduler.stop();
    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler.wait_idle())
        .await
        .is_err()
    {
        warn!(
            in_flight = scheduler.in_flight(),
            "runs still active after grace period, saving anyway"
        );
    }

    if let Err(e) = ledger.save() {
        warn!(error = %e, "final history save failed");
    }
    info!("ferry stopped");
    Ok(())
}
