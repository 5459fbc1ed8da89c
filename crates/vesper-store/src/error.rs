use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached (connection refused, dropped, timed out).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store answered but rejected the command.
    #[error("Store command failed: {0}")]
    Backend(String),

    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    #[error("Store state poisoned")]
    Poisoned,
}

impl StoreError {
    /// Whether the error means the store itself is unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
