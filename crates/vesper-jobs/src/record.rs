use crate::job::HandlerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Longest wait between two attempts of a job (100 years)
pub const MAX_BACKOFF: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Delivery tier within a queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Every tier, in the order workers poll them
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job
///
/// ```text
/// PENDING -> PROCESSING -> COMPLETED
///                 |-> RETRYING -> PENDING
///                 `-> DEAD -(operator retry)-> PENDING
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Retrying,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Retrying => "retrying",
            JobStatus::Dead => "dead",
        }
    }

    /// Completed and dead jobs are never picked up again on their own
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Dead)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Retrying)
                | (Processing, Dead)
                | (Retrying, Pending)
                | (Dead, Pending)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted job metadata
///
/// The queue owns every field except `payload`, which only the registered
/// handler interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub queue: String,
    pub priority: Priority,
    pub status: JobStatus,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub max_retries: u32,
    pub retry_count: u32,
    /// Base backoff in seconds
    pub retry_delay: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub error_stack: Option<String>,
}

impl JobRecord {
    /// 1-based number of the current (or next) execution
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }

    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Backoff before the next retry: `retry_delay * 2^retry_count` seconds,
    /// capped at [`MAX_BACKOFF`]
    pub fn next_delay(&self) -> Duration {
        let factor = 2u64.saturating_pow(self.retry_count);
        Duration::from_secs(self.retry_delay.saturating_mul(factor)).min(MAX_BACKOFF)
    }

    fn transition(&mut self, next: JobStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal job transition {} -> {}",
            self.status,
            next
        );
        self.status = next;
    }

    pub(crate) fn start(&mut self, now: DateTime<Utc>) {
        self.transition(JobStatus::Processing);
        self.started_at = Some(now);
    }

    pub(crate) fn complete(&mut self, result: serde_json::Value, now: DateTime<Utc>) {
        self.transition(JobStatus::Completed);
        self.completed_at = Some(now);
        self.result = Some(result);
        self.error = None;
        self.error_stack = None;
    }

    /// Record the failure and move to RETRYING. Returns the due time.
    pub(crate) fn schedule_retry(
        &mut self,
        err: &HandlerError,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let due = chrono::Duration::from_std(self.next_delay())
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.transition(JobStatus::Retrying);
        self.retry_count += 1;
        self.scheduled_for = Some(due);
        self.record_error(err);
        due
    }

    /// Record the final failure and move to DEAD
    pub(crate) fn bury(&mut self, err: &HandlerError, now: DateTime<Utc>) {
        self.transition(JobStatus::Dead);
        self.completed_at = Some(now);
        self.record_error(err);
    }

    /// RETRYING -> PENDING once the scheduler promotes the job
    pub(crate) fn mark_pending(&mut self) {
        self.transition(JobStatus::Pending);
    }

    /// Operator retry of a dead job: a fresh start with a reset retry budget
    pub(crate) fn revive(&mut self) {
        self.transition(JobStatus::Pending);
        self.retry_count = 0;
        self.started_at = None;
        self.completed_at = None;
        self.scheduled_for = None;
    }

    fn record_error(&mut self, err: &HandlerError) {
        self.error = Some(err.to_string());
        self.error_stack = err.stack();
    }
}
