use crate::error::{JobError, Result};
use crate::queue::{JobQueue, ProcessOutcome};
use crate::shutdown::Shutdown;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A pool of concurrent consumers for one queue
///
/// Each worker is its own task looping on a bounded blocking pop, so the
/// stop flag is observed at least once per poll timeout. A job that is
/// already running is never interrupted: [`WorkerPool::shutdown`] waits for
/// it to be settled.
pub struct WorkerPool {
    queue_name: String,
    workers: Vec<JoinHandle<()>>,
    shutdown: Shutdown,
}

impl WorkerPool {
    /// Start `concurrency` workers consuming `queue_name`
    ///
    /// # Errors
    ///
    /// Returns [`JobError::ConfigError`] if `concurrency` is 0.
    pub fn start(
        queue: JobQueue,
        queue_name: impl Into<String>,
        concurrency: usize,
    ) -> Result<Self> {
        Self::start_with_shutdown(queue, queue_name, concurrency, Shutdown::new())
    }

    /// Start workers that also stop when `shutdown` is triggered elsewhere
    pub fn start_with_shutdown(
        queue: JobQueue,
        queue_name: impl Into<String>,
        concurrency: usize,
        shutdown: Shutdown,
    ) -> Result<Self> {
        if concurrency == 0 {
            return Err(JobError::ConfigError(
                "concurrency must be greater than 0".into(),
            ));
        }

        let queue_name = queue_name.into();
        let poll_timeout = queue.config().poll_timeout_duration();
        let error_backoff = queue.config().error_backoff_duration();

        let mut workers = Vec::with_capacity(concurrency);
        for worker_id in 0..concurrency {
            let queue = queue.clone();
            let queue_name = queue_name.clone();
            let stop = shutdown.clone();

            let handle = tokio::spawn(async move {
                debug!(worker_id, queue = %queue_name, "Worker starting");

                while !stop.is_triggered() {
                    match queue.process_next(&queue_name, poll_timeout).await {
                        Ok(Some(outcome)) => {
                            if let ProcessOutcome::Skipped(status) = outcome {
                                debug!(worker_id, status = %status, "Skipped duplicate delivery");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!(
                                worker_id,
                                queue = %queue_name,
                                error = %e,
                                "Failed to process job"
                            );
                            tokio::time::sleep(error_backoff).await;
                        }
                    }
                }

                debug!(worker_id, queue = %queue_name, "Worker shutting down");
            });

            workers.push(handle);
        }

        info!(queue = %queue_name, concurrency, "Worker pool started");
        Ok(Self {
            queue_name,
            workers,
            shutdown,
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Gracefully shut down the pool
    ///
    /// Signals every worker to stop and waits for in-flight jobs to finish.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::WorkerPanicked`] if a worker task panicked.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.trigger();

        for (idx, handle) in self.workers.into_iter().enumerate() {
            handle.await.map_err(|e| {
                JobError::WorkerPanicked(format!("Worker {} panicked: {}", idx, e))
            })?;
        }

        info!(queue = %self.queue_name, "All workers shut down");
        Ok(())
    }
}
