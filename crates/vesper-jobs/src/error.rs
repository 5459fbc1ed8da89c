use crate::record::JobStatus;
use thiserror::Error;
use vesper_store::StoreError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {id} is {status}, expected {expected}")]
    InvalidState {
        id: String,
        status: JobStatus,
        expected: JobStatus,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),
}

impl JobError {
    /// Whether the shared store could not be reached
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, JobError::Store(e) if e.is_unavailable())
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
