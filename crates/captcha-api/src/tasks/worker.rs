//! Task worker: consumes the broker queue and runs the periodic scheduler.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use captcha_common::constants::{BROKER_POLL_TIMEOUT_SECS, tasks};

use super::schedule::{Beat, Crontab, TaskSignature};
use super::{RedisBroker, TaskRegistry, TaskRunner, cleanup};
use crate::state::AppContext;

/// Every task this worker can execute, bound to the application context
pub fn task_registry(context: AppContext) -> TaskRegistry {
    let mut registry = TaskRegistry::new(context);
    registry.register(tasks::DELETE_OLD_CAPTCHAS, cleanup::delete_old_captchas);
    registry
}

/// Runs once, right after the task runner is configured
pub fn setup_periodic_tasks(beat: &mut Beat) {
    // Executes every hour the delete old captchas task
    beat.add_periodic_task(
        Crontab::hourly(),
        TaskSignature::new(tasks::DELETE_OLD_CAPTCHAS),
    );
}

/// Run the worker until shutdown
pub async fn run_worker(
    runner: Arc<TaskRunner>,
    context: AppContext,
    shutdown: broadcast::Sender<()>,
) -> Result<()> {
    let Some(broker) = runner.broker().cloned() else {
        tracing::warn!("Task runner is disabled, worker has nothing to consume");
        return Ok(());
    };

    let mut beat = Beat::new();
    setup_periodic_tasks(&mut beat);

    let registry = Arc::new(task_registry(context));

    tracing::info!(
        broker = %broker.config().broker_url,
        periodic = beat.entries().len(),
        "Worker started"
    );

    let consumer = tokio::spawn(consume(broker.clone(), registry, shutdown.subscribe()));
    let scheduler = tokio::spawn(run_beat(beat, runner, broker, shutdown.subscribe()));

    let (consumer, scheduler) = tokio::join!(consumer, scheduler);
    consumer?;
    scheduler?;

    tracing::info!("Worker stopped");
    Ok(())
}

/// Pop and execute messages until shutdown
async fn consume(
    broker: RedisBroker,
    registry: Arc<TaskRegistry>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        // BRPOP returns within the poll timeout, so shutdown is seen promptly
        if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
            tracing::info!("Consumer shutting down...");
            break;
        }

        match broker.pop(BROKER_POLL_TIMEOUT_SECS).await {
            Ok(Some(message)) => {
                let result = registry.execute(&message).await;
                if let Err(e) = broker.store_result(&result).await {
                    tracing::error!(task_id = %result.task_id, error = %e, "Failed to store task result");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Broker receive error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Sleep until the next due entry, claim its slot, enqueue it
async fn run_beat(
    beat: Beat,
    runner: Arc<TaskRunner>,
    broker: RedisBroker,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let now = chrono::Utc::now();
        let Some((fire_at, due)) = beat.next_due(now.timestamp()) else {
            tracing::debug!("No periodic tasks registered");
            return;
        };

        let wait_ms = (fire_at * 1_000 - now.timestamp_millis()).max(0) as u64;

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {
                for entry in due {
                    let task = &entry.signature.task;
                    match broker.claim_slot(task, fire_at, entry.schedule.period_secs()).await {
                        Ok(true) => {
                            if let Err(e) = runner.dispatch(task, entry.signature.args.clone()).await {
                                tracing::error!(task = %task, error = %e, "Failed to enqueue periodic task");
                            }
                        }
                        Ok(false) => {
                            tracing::debug!(task = %task, fire_at = fire_at, "Slot already claimed by another worker");
                        }
                        Err(e) => {
                            tracing::error!(task = %task, error = %e, "Failed to claim schedule slot");
                        }
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Scheduler shutting down...");
                break;
            }
        }
    }
}
