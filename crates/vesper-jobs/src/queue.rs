use crate::config::QueueConfig;
use crate::error::{JobError, Result};
use crate::job::{HandlerError, Job, JobContext, JobHandler};
use crate::keys::Keyspace;
use crate::record::{JobRecord, JobStatus, Priority};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;
use vesper_store::Store;

/// Main job queue manager
///
/// Cheap to clone; clones share the store handle and the handler registry.
/// Several queues with different key prefixes can live side by side on one
/// store.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn Store>,
    keys: Keyspace,
    config: QueueConfig,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn JobHandler>>>>,
}

impl JobQueue {
    /// Create a job queue with the default configuration
    pub fn new(store: Arc<dyn Store>) -> Self {
        let config = QueueConfig::default();
        Self {
            store,
            keys: Keyspace::new(config.key_prefix.clone()),
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_config(store: Arc<dyn Store>, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            keys: Keyspace::new(config.key_prefix.clone()),
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn keys(&self) -> &Keyspace {
        &self.keys
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Register a typed job under `J::NAME`
    pub async fn register_job<J: Job>(&self, job: J) {
        self.register_handler(J::NAME, job).await;
    }

    /// Register a handler for `job_type`, replacing any previous one
    pub async fn register_handler<H>(&self, job_type: impl Into<String>, handler: H)
    where
        H: JobHandler + 'static,
    {
        let job_type = job_type.into();
        tracing::debug!(job_type = %job_type, "Registered job handler");
        let mut handlers = self.handlers.write().await;
        handlers.insert(job_type, Arc::new(handler));
    }

    /// Enqueue a job
    pub async fn enqueue<J: Job>(&self, data: J::Data) -> Result<JobRecord> {
        self.enqueue_opts::<J>(data, EnqueueOptions::default())
            .await
    }

    /// Enqueue a job with options
    pub async fn enqueue_opts<J: Job>(
        &self,
        data: J::Data,
        opts: EnqueueOptions,
    ) -> Result<JobRecord> {
        let payload = serde_json::to_value(data)?;
        self.enqueue_raw(J::NAME, payload, opts).await
    }

    /// Enqueue an untyped payload for `job_type`
    ///
    /// The job type does not need a registered handler yet. With a zero
    /// delay the id goes straight onto its ready list; otherwise it waits in
    /// the scheduled set until the scheduler promotes it.
    pub async fn enqueue_raw(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        opts: EnqueueOptions,
    ) -> Result<JobRecord> {
        let now = Utc::now();
        let due = if opts.delay.is_zero() {
            None
        } else {
            let due = chrono::Duration::from_std(opts.delay)
                .ok()
                .and_then(|delay| now.checked_add_signed(delay))
                .ok_or_else(|| {
                    JobError::ConfigError(format!("Delay too large: {:?}", opts.delay))
                })?;
            Some(due)
        };

        let job = JobRecord {
            id: Uuid::new_v4().to_string(),
            queue: opts
                .queue
                .unwrap_or_else(|| self.config.default_queue.clone()),
            priority: opts.priority,
            status: JobStatus::Pending,
            job_type: job_type.to_string(),
            payload,
            tenant_id: opts.tenant_id,
            user_id: opts.user_id,
            max_retries: opts.max_retries.unwrap_or(self.config.default_max_retries),
            retry_count: 0,
            retry_delay: opts
                .retry_delay
                .map(ceil_secs)
                .unwrap_or(self.config.default_retry_delay_secs),
            created_at: now,
            started_at: None,
            completed_at: None,
            scheduled_for: due,
            result: None,
            error: None,
            error_stack: None,
        };

        self.update_job(&job).await?;
        match due {
            None => {
                self.store
                    .rpush(&self.keys.ready(&job.queue, job.priority), &job.id)
                    .await?
            }
            Some(due) => {
                self.store
                    .zadd(&self.keys.scheduled(), &job.id, epoch_secs(due))
                    .await?
            }
        }

        tracing::info!(
            job_id = %job.id,
            queue = %job.queue,
            job_type = %job.job_type,
            priority = %job.priority,
            delayed = due.is_some(),
            "Job enqueued"
        );
        Ok(job)
    }

    /// Load a job record; `None` once its retention has expired
    pub async fn get_job(&self, id: &str) -> Result<Option<JobRecord>> {
        match self.store.get(&self.keys.job(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Replace a job record, resetting its retention window
    ///
    /// There is no optimistic concurrency: only the worker holding the job
    /// should call this while it is being processed.
    pub async fn update_job(&self, job: &JobRecord) -> Result<()> {
        let raw = serde_json::to_string(job)?;
        self.store
            .set_ex(&self.keys.job(&job.id), &raw, self.config.job_ttl_duration())
            .await?;
        Ok(())
    }

    /// Wait up to `timeout` for a ready job in `queue` and process it
    ///
    /// Ready lists are checked high, normal, low on every poll. Returns
    /// `Ok(None)` when nothing became ready in time. Handler failures are
    /// routed to retry or the dead-letter list and reported as an outcome;
    /// only store and serialization failures surface as errors.
    pub async fn process_next(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<ProcessOutcome>> {
        let ready = self.keys.ready_all(queue);
        let Some((_, id)) = self.store.blpop(&ready, timeout).await? else {
            return Ok(None);
        };

        let processing = self.keys.processing(queue);
        let claimed = self.store.sadd(&processing, &id).await?;
        let outcome = self.dispatch(&id, &processing).await?;
        match outcome {
            // Settling already moved the id out of the processing set.
            ProcessOutcome::Retrying { .. } | ProcessOutcome::Dead => {}
            // A duplicate of an id another worker holds keeps that worker's claim.
            ProcessOutcome::Skipped(_) | ProcessOutcome::Missing if !claimed => {}
            _ => {
                self.store.srem(&processing, &id).await?;
            }
        }
        Ok(Some(outcome))
    }

    /// Process one job from `queue` if one is ready right now
    pub async fn process_one(&self, queue: &str) -> Result<Option<ProcessOutcome>> {
        self.process_next(queue, Duration::ZERO).await
    }

    async fn dispatch(&self, id: &str, processing: &str) -> Result<ProcessOutcome> {
        let Some(mut job) = self.get_job(id).await? else {
            tracing::warn!(job_id = %id, "Job record missing, discarding id");
            return Ok(ProcessOutcome::Missing);
        };

        // A duplicate id in a ready list must not run the job twice.
        if job.status != JobStatus::Pending {
            tracing::debug!(job_id = %id, status = %job.status, "Skipping job that is not pending");
            return Ok(ProcessOutcome::Skipped(job.status));
        }

        job.start(Utc::now());
        self.update_job(&job).await?;
        tracing::debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempt(),
            "Processing job"
        );

        let handler = self.handlers.read().await.get(&job.job_type).cloned();
        let result = match handler {
            Some(handler) => {
                let ctx = JobContext::new(&job);
                AssertUnwindSafe(handler.handle(ctx, job.payload.clone()))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(HandlerError::new(format!(
                            "Handler panicked: {}",
                            panic_message(panic.as_ref())
                        )))
                    })
            }
            None => Err(HandlerError::new(format!(
                "No handler registered for job type: {}",
                job.job_type
            ))),
        };

        self.settle(job, processing, result).await
    }

    /// Persist the outcome of an execution, then move the id to its next home
    ///
    /// A retried or dead job leaves `processing` in the same store operation
    /// that gives it its new home, so the id is never in two places at once.
    async fn settle(
        &self,
        mut job: JobRecord,
        processing: &str,
        result: std::result::Result<serde_json::Value, HandlerError>,
    ) -> Result<ProcessOutcome> {
        let now = Utc::now();
        match result {
            Ok(value) => {
                job.complete(value, now);
                self.update_job(&job).await?;
                tracing::info!(job_id = %job.id, queue = %job.queue, "Job completed");
                Ok(ProcessOutcome::Completed)
            }
            Err(err) if job.has_retries_left() => {
                let delay = job.next_delay();
                let due = job.schedule_retry(&err, now);
                self.update_job(&job).await?;
                self.store
                    .smove_to_zset(processing, &job.id, &self.keys.scheduled(), epoch_secs(due))
                    .await?;
                tracing::warn!(
                    job_id = %job.id,
                    queue = %job.queue,
                    retry_count = job.retry_count,
                    max_retries = job.max_retries,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "Job failed, retry scheduled"
                );
                Ok(ProcessOutcome::Retrying {
                    attempt: job.retry_count,
                    delay,
                })
            }
            Err(err) => {
                job.bury(&err, now);
                self.update_job(&job).await?;
                self.store
                    .smove_to_list(processing, &job.id, &self.keys.dead(&job.queue))
                    .await?;
                tracing::error!(
                    job_id = %job.id,
                    queue = %job.queue,
                    retry_count = job.retry_count,
                    error = %err,
                    "Job failed permanently, moved to dead-letter queue"
                );
                Ok(ProcessOutcome::Dead)
            }
        }
    }

    /// Move up to `limit` scheduled jobs due at or before `now` onto their
    /// ready lists. Returns how many this call moved.
    ///
    /// Each move is an atomic remove-then-push, so concurrent schedulers
    /// never promote the same id twice.
    pub async fn promote_due(&self, now: DateTime<Utc>, limit: usize) -> Result<usize> {
        let scheduled = self.keys.scheduled();
        let due = self
            .store
            .zrangebyscore(&scheduled, epoch_secs(now), limit)
            .await?;

        let mut promoted = 0;
        for id in due {
            let Some(mut job) = self.get_job(&id).await? else {
                tracing::warn!(job_id = %id, "Scheduled job record missing, dropping id");
                self.store.zrem(&scheduled, &id).await?;
                continue;
            };

            if job.status == JobStatus::Retrying {
                // Another scheduler may have taken it since the range read.
                if self.store.zscore(&scheduled, &id).await?.is_none() {
                    continue;
                }
                job.mark_pending();
                self.update_job(&job).await?;
            }

            let ready = self.keys.ready(&job.queue, job.priority);
            if self.store.zmove_to_list(&scheduled, &id, &ready).await? {
                promoted += 1;
                tracing::debug!(job_id = %id, queue = %job.queue, "Promoted scheduled job");
            }
        }

        if promoted > 0 {
            tracing::debug!(count = promoted, "Promoted due jobs");
        }
        Ok(promoted)
    }

    /// Pending, processing and dead-letter counts for `queue`
    pub async fn stats(&self, queue: &str) -> Result<QueueStats> {
        let high = self.store.llen(&self.keys.ready(queue, Priority::High)).await?;
        let normal = self.store.llen(&self.keys.ready(queue, Priority::Normal)).await?;
        let low = self.store.llen(&self.keys.ready(queue, Priority::Low)).await?;
        let processing = self.store.scard(&self.keys.processing(queue)).await?;
        let dead = self.store.llen(&self.keys.dead(queue)).await?;

        Ok(QueueStats {
            queue: queue.to_string(),
            pending: PriorityCounts { high, normal, low },
            processing,
            dead,
        })
    }

    /// Jobs waiting in the scheduled set, across all queues
    pub async fn scheduled_count(&self) -> Result<usize> {
        Ok(self.store.zcard(&self.keys.scheduled()).await?)
    }

    /// Oldest `limit` dead-lettered jobs of `queue`
    pub async fn dead_letters(&self, queue: &str, limit: usize) -> Result<Vec<JobRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = isize::try_from(limit - 1).unwrap_or(isize::MAX);
        let ids = self.store.lrange(&self.keys.dead(queue), 0, stop).await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = self.get_job(&id).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    /// Operator retry of a dead job: reset its retry budget and make it ready
    pub async fn retry_dead(&self, id: &str) -> Result<JobRecord> {
        let mut job = self
            .get_job(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        if job.status != JobStatus::Dead {
            return Err(JobError::InvalidState {
                id: id.to_string(),
                status: job.status,
                expected: JobStatus::Dead,
            });
        }

        self.store.lrem(&self.keys.dead(&job.queue), id).await?;
        job.revive();
        self.update_job(&job).await?;
        self.store
            .rpush(&self.keys.ready(&job.queue, job.priority), id)
            .await?;

        tracing::info!(job_id = %id, queue = %job.queue, "Dead job re-enqueued");
        Ok(job)
    }
}

/// Options for enqueueing a job
///
/// Unset fields fall back to the queue's [`QueueConfig`].
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub queue: Option<String>,
    pub priority: Priority,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub delay: Duration,
}

impl EnqueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Base backoff, stored in whole seconds; fractions round up
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn delay(mut self, duration: Duration) -> Self {
        self.delay = duration;
        self
    }
}

/// What happened to the job taken off a ready list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    /// The handler failed; `attempt` is the new retry_count
    Retrying { attempt: u32, delay: Duration },
    Dead,
    /// The id was not PENDING (duplicate delivery); nothing ran
    Skipped(JobStatus),
    /// The record had already expired
    Missing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityCounts {
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl PriorityCounts {
    pub fn total(&self) -> usize {
        self.high + self.normal + self.low
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub queue: String,
    pub pending: PriorityCounts,
    pub processing: usize,
    pub dead: usize,
}

/// Whole seconds, rounding any fraction up
fn ceil_secs(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_add(u64::from(duration.subsec_nanos() > 0))
}

fn epoch_secs(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
