use crate::error::{JobError, Result};
use serde::Deserialize;
use std::time::Duration;

/// Queue, scheduler and worker settings
///
/// Deserializable so it can be loaded from the environment
/// (`VESPER_QUEUE_JOB_TTL_SECS=3600`, ...); every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Namespace for every key the queue writes
    pub key_prefix: String,
    /// Retention of job records, regardless of terminal status
    pub job_ttl_secs: u64,
    pub default_queue: String,
    pub default_max_retries: u32,
    /// Base backoff in seconds
    pub default_retry_delay_secs: u64,
    /// Upper bound of one blocking pop; also the worker's shutdown latency
    pub poll_timeout_ms: u64,
    pub scheduler_interval_ms: u64,
    /// Scheduled ids promoted per scheduler tick
    pub promote_batch: usize,
    /// Pause after a store error before a worker polls again
    pub error_backoff_ms: u64,
    /// Default concurrency of a worker pool
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            key_prefix: "vesper".to_string(),
            job_ttl_secs: 24 * 60 * 60,
            default_queue: "default".to_string(),
            default_max_retries: 3,
            default_retry_delay_secs: 60,
            poll_timeout_ms: 1_000,
            scheduler_interval_ms: 1_000,
            promote_batch: 100,
            error_backoff_ms: 1_000,
            workers: 4,
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn job_ttl(mut self, ttl: Duration) -> Self {
        self.job_ttl_secs = ttl.as_secs();
        self
    }

    pub fn default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    pub fn default_retry_delay(mut self, delay: Duration) -> Self {
        self.default_retry_delay_secs = delay.as_secs();
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn scheduler_interval(mut self, interval: Duration) -> Self {
        self.scheduler_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn promote_batch(mut self, batch: usize) -> Self {
        self.promote_batch = batch;
        self
    }

    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn job_ttl_duration(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    pub fn poll_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn scheduler_interval_duration(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms)
    }

    pub fn error_backoff_duration(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Reject settings that would stall or spin the background loops
    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.is_empty() {
            return Err(JobError::ConfigError("key_prefix must not be empty".into()));
        }
        if self.job_ttl_secs == 0 {
            return Err(JobError::ConfigError("job_ttl_secs must be greater than 0".into()));
        }
        if self.poll_timeout_ms == 0 {
            return Err(JobError::ConfigError(
                "poll_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.scheduler_interval_ms == 0 {
            return Err(JobError::ConfigError(
                "scheduler_interval_ms must be greater than 0".into(),
            ));
        }
        if self.promote_batch == 0 {
            return Err(JobError::ConfigError(
                "promote_batch must be greater than 0".into(),
            ));
        }
        if self.workers == 0 {
            return Err(JobError::ConfigError("workers must be greater than 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.job_ttl_duration(), Duration::from_secs(86_400));
        assert_eq!(config.scheduler_interval_duration(), Duration::from_secs(1));
        assert_eq!(config.default_max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = QueueConfig::new()
            .key_prefix("test")
            .poll_timeout(Duration::from_millis(50))
            .workers(8);
        assert_eq!(config.key_prefix, "test");
        assert_eq!(config.poll_timeout_duration(), Duration::from_millis(50));
        assert_eq!(config.workers, 8);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let err = QueueConfig::new().workers(0).validate().unwrap_err();
        assert!(err.to_string().contains("workers must be greater than 0"));

        let err = QueueConfig::new()
            .poll_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("poll_timeout_ms"));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: QueueConfig =
            serde_json::from_str(r#"{"key_prefix": "church", "workers": 2}"#).unwrap();
        assert_eq!(config.key_prefix, "church");
        assert_eq!(config.workers, 2);
        assert_eq!(config.default_queue, "default");
    }
}
