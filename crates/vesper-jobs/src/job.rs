use crate::record::JobRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::error::Error as StdError;
use std::fmt::Debug;
use std::future::Future;
use thiserror::Error;

/// Failure reported by a job handler
///
/// Handler errors never propagate past the worker: they are turned into a
/// retry or a dead-letter entry, with the message and its source chain
/// stored on the job record.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The source chain, one cause per line, if there is one
    pub fn stack(&self) -> Option<String> {
        let mut causes = Vec::new();
        let mut current = StdError::source(self);
        while let Some(cause) = current {
            causes.push(format!("caused by: {cause}"));
            current = cause.source();
        }
        (!causes.is_empty()).then(|| causes.join("\n"))
    }
}

/// Context passed to job execution
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub tenant_id: Option<String>,
    /// The full job record as it was when the handler was invoked
    pub job: JobRecord,
}

impl JobContext {
    pub(crate) fn new(job: &JobRecord) -> Self {
        Self {
            job_id: job.id.clone(),
            attempt: job.attempt(),
            created_at: job.created_at,
            tenant_id: job.tenant_id.clone(),
            job: job.clone(),
        }
    }
}

/// A job that can be executed
///
/// `NAME` is the job type tag stored on every record; the queue routes a
/// record to the handler registered under the same tag and decodes its
/// payload into `Data`.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// The job name/type
    const NAME: &'static str;

    /// The data required by the job
    type Data: Serialize + DeserializeOwned + Send + Sync + Debug;

    /// Execute the job. The returned value is stored as the job result.
    ///
    /// Delivery is at-least-once, so implementations must tolerate being
    /// run again for the same job.
    async fn execute(
        &self,
        ctx: JobContext,
        data: Self::Data,
    ) -> Result<serde_json::Value, HandlerError>;
}

/// A type-erased job handler
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: JobContext,
        data: serde_json::Value,
    ) -> Result<serde_json::Value, HandlerError>;
}

#[async_trait]
impl<J: Job> JobHandler for J {
    async fn handle(
        &self,
        ctx: JobContext,
        data: serde_json::Value,
    ) -> Result<serde_json::Value, HandlerError> {
        let data: J::Data = serde_json::from_value(data).map_err(|e| {
            HandlerError::with_source(format!("Invalid payload for {}", J::NAME), e)
        })?;
        self.execute(ctx, data).await
    }
}

/// Handler backed by an async closure, see [`handler_fn`]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as a [`JobHandler`]
///
/// ```ignore
/// queue
///     .register_handler("webhook.deliver", handler_fn(|ctx, payload| async move {
///         deliver(&ctx.job_id, payload).await?;
///         Ok(serde_json::Value::Null)
///     }))
///     .await;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(JobContext, serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> JobHandler for HandlerFn<F>
where
    F: Fn(JobContext, serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        ctx: JobContext,
        data: serde_json::Value,
    ) -> Result<serde_json::Value, HandlerError> {
        (self.f)(ctx, data).await
    }
}
