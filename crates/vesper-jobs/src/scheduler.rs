use crate::error::{JobError, Result};
use crate::queue::JobQueue;
use crate::shutdown::Shutdown;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Background task that promotes due delayed and retrying jobs
///
/// Every tick reads at most `promote_batch` due ids and moves them onto their
/// ready lists. A full batch means more may be due, so the next tick starts
/// right away instead of sleeping. Any number of schedulers can run against
/// the same store; promotion is an atomic move.
///
/// ```rust,ignore
/// let scheduler = Scheduler::spawn(queue.clone());
/// // ...
/// scheduler.shutdown().await?;
/// ```
pub struct Scheduler {
    handle: JoinHandle<()>,
    shutdown: Shutdown,
}

impl Scheduler {
    #[must_use = "scheduler must be stored to keep promoting jobs"]
    pub fn spawn(queue: JobQueue) -> Self {
        Self::spawn_with_shutdown(queue, Shutdown::new())
    }

    /// Spawn a scheduler that also stops when `shutdown` is triggered elsewhere
    #[must_use = "scheduler must be stored to keep promoting jobs"]
    pub fn spawn_with_shutdown(queue: JobQueue, shutdown: Shutdown) -> Self {
        let stop = shutdown.clone();
        let handle = tokio::spawn(async move {
            let interval = queue.config().scheduler_interval_duration();
            let batch = queue.config().promote_batch;
            debug!(interval_ms = interval.as_millis() as u64, batch, "Scheduler starting");

            while !stop.is_triggered() {
                match queue.promote_due(Utc::now(), batch).await {
                    Ok(promoted) if promoted >= batch => continue,
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Failed to promote scheduled jobs"),
                }
                tokio::time::sleep(interval).await;
            }

            debug!("Scheduler shutting down");
        });

        Self { handle, shutdown }
    }

    /// Stop after the current tick and wait for the task to finish
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.trigger();
        self.handle
            .await
            .map_err(|e| JobError::WorkerPanicked(format!("Scheduler panicked: {}", e)))?;
        info!("Scheduler shut down");
        Ok(())
    }
}
