use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vesper_jobs::{
    handler_fn, EnqueueOptions, HandlerError, Job, JobContext, JobError, JobQueue, JobStatus,
    Priority, ProcessOutcome,
};
use vesper_store::testing::UnavailableStore;
use vesper_store::{InMemoryStore, Store};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct WebhookData {
    url: String,
    event: String,
}

#[derive(Clone, Default)]
struct WebhookJob {
    // Shared state to verify execution
    delivered: Arc<Mutex<Vec<(WebhookData, Option<String>, u32)>>>,
}

#[async_trait]
impl Job for WebhookJob {
    const NAME: &'static str = "webhook.deliver";
    type Data = WebhookData;

    async fn execute(
        &self,
        ctx: JobContext,
        data: Self::Data,
    ) -> Result<serde_json::Value, HandlerError> {
        self.delivered
            .lock()
            .unwrap()
            .push((data, ctx.tenant_id, ctx.attempt));
        Ok(serde_json::json!({ "status": 200 }))
    }
}

#[derive(Clone, Default)]
struct FailingJob {
    invocations: Arc<Mutex<u32>>,
}

#[async_trait]
impl Job for FailingJob {
    const NAME: &'static str = "push.send";
    type Data = serde_json::Value;

    async fn execute(
        &self,
        _ctx: JobContext,
        _data: Self::Data,
    ) -> Result<serde_json::Value, HandlerError> {
        *self.invocations.lock().unwrap() += 1;
        Err(HandlerError::with_source(
            "push gateway rejected the message",
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset"),
        ))
    }
}

fn webhook(event: &str) -> WebhookData {
    WebhookData {
        url: "https://example.com/hooks".to_string(),
        event: event.to_string(),
    }
}

fn setup() -> (InMemoryStore, JobQueue) {
    let store = InMemoryStore::new();
    let queue = JobQueue::new(Arc::new(store.clone()));
    (store, queue)
}

fn far_future() -> chrono::DateTime<Utc> {
    Utc::now() + chrono::Duration::days(30)
}

#[tokio::test]
async fn test_immediate_job_lands_in_one_ready_list() {
    let (store, queue) = setup();

    let job = queue
        .enqueue_opts::<WebhookJob>(
            webhook("member.created"),
            EnqueueOptions::new().queue("webhooks").priority(Priority::High),
        )
        .await
        .expect("Enqueue failed");

    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.scheduled_for.is_none());

    let keys = queue.keys();
    assert_eq!(
        store.lrange(&keys.ready("webhooks", Priority::High), 0, -1).await.unwrap(),
        vec![job.id.clone()]
    );
    assert_eq!(store.llen(&keys.ready("webhooks", Priority::Normal)).await.unwrap(), 0);
    assert_eq!(store.llen(&keys.ready("webhooks", Priority::Low)).await.unwrap(), 0);
    assert_eq!(store.zscore(&keys.scheduled(), &job.id).await.unwrap(), None);

    let ttl = store.ttl(&keys.job(&job.id)).await.unwrap().unwrap();
    assert!(ttl > Duration::from_secs(23 * 3600));
}

#[tokio::test]
async fn test_delayed_job_waits_in_scheduled_set() {
    let (store, queue) = setup();
    let before = Utc::now().timestamp_millis() as f64 / 1000.0;

    let job = queue
        .enqueue_opts::<WebhookJob>(
            webhook("donation.received"),
            EnqueueOptions::new().delay(Duration::from_secs(120)),
        )
        .await
        .unwrap();

    let score = store
        .zscore(&queue.keys().scheduled(), &job.id)
        .await
        .unwrap()
        .expect("job should be scheduled");
    assert!(score >= before + 120.0 && score < before + 125.0);

    let stats = queue.stats("default").await.unwrap();
    assert_eq!(stats.pending.total(), 0);
    assert_eq!(queue.process_one("default").await.unwrap(), None);

    // Not due yet
    assert_eq!(queue.promote_due(Utc::now(), 100).await.unwrap(), 0);

    assert_eq!(queue.promote_due(far_future(), 100).await.unwrap(), 1);
    assert_eq!(queue.stats("default").await.unwrap().pending.normal, 1);
    assert_eq!(queue.scheduled_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_handler_receives_typed_payload_and_context() {
    let (_store, queue) = setup();
    let job = WebhookJob::default();
    queue.register_job(job.clone()).await;

    let record = queue
        .enqueue_opts::<WebhookJob>(
            webhook("devotional.published"),
            EnqueueOptions::new().tenant("church-42").user("user-7"),
        )
        .await
        .unwrap();

    assert_eq!(
        queue.process_one("default").await.unwrap(),
        Some(ProcessOutcome::Completed)
    );

    let delivered = job.delivered.lock().unwrap().clone();
    assert_eq!(
        delivered,
        vec![(webhook("devotional.published"), Some("church-42".to_string()), 1)]
    );

    let stored = queue.get_job(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.user_id.as_deref(), Some("user-7"));
    assert_eq!(stored.result, Some(serde_json::json!({ "status": 200 })));
}

#[tokio::test]
async fn test_exhausted_retries_end_in_dead_letter_queue() {
    let (store, queue) = setup();
    let job = FailingJob::default();
    queue.register_job(job.clone()).await;

    let record = queue
        .enqueue_opts::<FailingJob>(
            serde_json::json!({ "token": "abc" }),
            EnqueueOptions::new()
                .queue("notifications")
                .priority(Priority::High)
                .max_retries(2)
                .retry_delay(Duration::from_secs(10)),
        )
        .await
        .unwrap();

    for (attempt, expected_delay) in [(1u32, 10i64), (2, 20)] {
        let outcome = queue.process_one("notifications").await.unwrap();
        assert_eq!(
            outcome,
            Some(ProcessOutcome::Retrying {
                attempt,
                delay: Duration::from_secs(expected_delay as u64),
            })
        );

        let stored = queue.get_job(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Retrying);
        assert_eq!(stored.retry_count, attempt);
        let waited = stored.scheduled_for.unwrap() - stored.started_at.unwrap();
        assert!(waited >= chrono::Duration::seconds(expected_delay));
        assert!(waited < chrono::Duration::seconds(expected_delay + 1));
        assert_eq!(stored.error.as_deref(), Some("push gateway rejected the message"));
        assert_eq!(stored.error_stack.as_deref(), Some("caused by: connection reset"));

        // Retrying jobs sit only in the scheduled set
        assert!(store
            .zscore(&queue.keys().scheduled(), &record.id)
            .await
            .unwrap()
            .is_some());
        assert_eq!(queue.stats("notifications").await.unwrap().pending.total(), 0);

        assert_eq!(queue.promote_due(far_future(), 100).await.unwrap(), 1);
        let promoted = queue.get_job(&record.id).await.unwrap().unwrap();
        assert_eq!(promoted.status, JobStatus::Pending);
    }

    assert_eq!(
        queue.process_one("notifications").await.unwrap(),
        Some(ProcessOutcome::Dead)
    );
    assert_eq!(*job.invocations.lock().unwrap(), 3);

    let dead = queue.dead_letters("notifications", 10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, record.id);
    assert_eq!(dead[0].status, JobStatus::Dead);
    assert_eq!(dead[0].retry_count, 2);

    // Never requeued on its own
    assert_eq!(queue.promote_due(far_future(), 100).await.unwrap(), 0);
    assert_eq!(queue.process_one("notifications").await.unwrap(), None);
    assert_eq!(*job.invocations.lock().unwrap(), 3);

    let stats = queue.stats("notifications").await.unwrap();
    assert_eq!(stats.dead, 1);
    assert_eq!(stats.processing, 0);
}

#[tokio::test]
async fn test_concurrent_promotion_moves_each_job_once() {
    let (store, queue) = setup();
    let record = queue
        .enqueue_raw(
            "report.generate",
            serde_json::Value::Null,
            EnqueueOptions::new().delay(Duration::from_secs(1)),
        )
        .await
        .unwrap();

    let other = queue.clone();
    let at = far_future();
    let (a, b) = tokio::join!(queue.promote_due(at, 100), other.promote_due(at, 100));
    assert_eq!(a.unwrap() + b.unwrap(), 1);

    let ready = store
        .lrange(&queue.keys().ready("default", Priority::Normal), 0, -1)
        .await
        .unwrap();
    assert_eq!(ready, vec![record.id]);
}

#[tokio::test]
async fn test_duplicate_delivery_of_completed_job_is_noop() {
    let (store, queue) = setup();
    let job = WebhookJob::default();
    queue.register_job(job.clone()).await;

    let record = queue
        .enqueue::<WebhookJob>(webhook("member.updated"))
        .await
        .unwrap();
    assert_eq!(
        queue.process_one("default").await.unwrap(),
        Some(ProcessOutcome::Completed)
    );

    // Simulate a second promotion of the same id
    store
        .rpush(&queue.keys().ready("default", Priority::Normal), &record.id)
        .await
        .unwrap();

    assert_eq!(
        queue.process_one("default").await.unwrap(),
        Some(ProcessOutcome::Skipped(JobStatus::Completed))
    );
    assert_eq!(job.delivered.lock().unwrap().len(), 1);
    let stats = queue.stats("default").await.unwrap();
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.pending.total(), 0);
}

#[tokio::test]
async fn test_expired_record_is_discarded() {
    let (store, queue) = setup();
    store
        .rpush(&queue.keys().ready("default", Priority::Low), "gone")
        .await
        .unwrap();

    assert_eq!(
        queue.process_one("default").await.unwrap(),
        Some(ProcessOutcome::Missing)
    );
    assert_eq!(queue.stats("default").await.unwrap().processing, 0);
}

#[tokio::test]
async fn test_retry_dead_resets_budget() {
    let (_store, queue) = setup();
    queue.register_job(FailingJob::default()).await;

    let record = queue
        .enqueue_opts::<FailingJob>(
            serde_json::Value::Null,
            EnqueueOptions::new().max_retries(0).priority(Priority::Low),
        )
        .await
        .unwrap();
    assert_eq!(
        queue.process_one("default").await.unwrap(),
        Some(ProcessOutcome::Dead)
    );

    let revived = queue.retry_dead(&record.id).await.unwrap();
    assert_eq!(revived.status, JobStatus::Pending);
    assert_eq!(revived.retry_count, 0);

    let stats = queue.stats("default").await.unwrap();
    assert_eq!(stats.dead, 0);
    assert_eq!(stats.pending.low, 1);

    let err = queue.retry_dead(&record.id).await.unwrap_err();
    assert!(matches!(
        err,
        JobError::InvalidState {
            status: JobStatus::Pending,
            ..
        }
    ));
    assert!(matches!(
        queue.retry_dead("no-such-job").await,
        Err(JobError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_missing_handler_goes_through_retry() {
    let (_store, queue) = setup();
    let record = queue
        .enqueue_raw(
            "ai.generate",
            serde_json::json!({ "prompt": "psalm 23" }),
            EnqueueOptions::new().max_retries(1),
        )
        .await
        .unwrap();

    let outcome = queue.process_one("default").await.unwrap();
    assert!(matches!(outcome, Some(ProcessOutcome::Retrying { attempt: 1, .. })));

    let stored = queue.get_job(&record.id).await.unwrap().unwrap();
    assert_eq!(
        stored.error.as_deref(),
        Some("No handler registered for job type: ai.generate")
    );
}

#[tokio::test]
async fn test_handler_panic_is_caught() {
    let (_store, queue) = setup();
    queue
        .register_handler(
            "message.send",
            handler_fn(|_ctx, _payload| async move {
                if true {
                    panic!("sms provider exploded");
                }
                Ok::<_, HandlerError>(serde_json::Value::Null)
            }),
        )
        .await;

    let record = queue
        .enqueue_raw("message.send", serde_json::Value::Null, EnqueueOptions::new())
        .await
        .unwrap();

    let outcome = queue.process_one("default").await.unwrap();
    assert!(matches!(outcome, Some(ProcessOutcome::Retrying { .. })));

    let stored = queue.get_job(&record.id).await.unwrap().unwrap();
    assert_eq!(
        stored.error.as_deref(),
        Some("Handler panicked: sms provider exploded")
    );
}

#[tokio::test]
async fn test_invalid_payload_is_handler_failure() {
    let (_store, queue) = setup();
    let job = WebhookJob::default();
    queue.register_job(job.clone()).await;

    let record = queue
        .enqueue_raw(
            WebhookJob::NAME,
            serde_json::json!({ "unexpected": true }),
            EnqueueOptions::new().max_retries(0),
        )
        .await
        .unwrap();

    assert_eq!(
        queue.process_one("default").await.unwrap(),
        Some(ProcessOutcome::Dead)
    );
    assert!(job.delivered.lock().unwrap().is_empty());
    let stored = queue.get_job(&record.id).await.unwrap().unwrap();
    assert_eq!(
        stored.error.as_deref(),
        Some("Invalid payload for webhook.deliver")
    );
}

#[tokio::test]
async fn test_queues_are_isolated_by_prefix() {
    let store = InMemoryStore::new();
    let a = JobQueue::with_config(
        Arc::new(store.clone()),
        vesper_jobs::QueueConfig::new().key_prefix("a"),
    )
    .unwrap();
    let b = JobQueue::with_config(
        Arc::new(store.clone()),
        vesper_jobs::QueueConfig::new().key_prefix("b"),
    )
    .unwrap();

    let record = a.enqueue::<WebhookJob>(webhook("x")).await.unwrap();
    assert!(b.get_job(&record.id).await.unwrap().is_none());
    assert_eq!(b.stats("default").await.unwrap().pending.total(), 0);
    assert_eq!(a.stats("default").await.unwrap().pending.total(), 1);
}

#[tokio::test]
async fn test_unavailable_store_fails_closed() {
    let queue = JobQueue::new(Arc::new(UnavailableStore));

    let err = queue
        .enqueue::<WebhookJob>(webhook("member.created"))
        .await
        .unwrap_err();
    assert!(err.is_store_unavailable());

    assert!(queue.get_job("anything").await.is_err());
    assert!(queue.process_one("default").await.is_err());
    assert!(queue.promote_due(Utc::now(), 10).await.is_err());
}

#[tokio::test]
async fn test_delay_past_calendar_range_is_rejected() {
    let (_store, queue) = setup();

    let err = queue
        .enqueue_raw(
            "report.generate",
            serde_json::Value::Null,
            EnqueueOptions::new().delay(Duration::from_secs(10_000_000_000_000)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::ConfigError(_)));
    assert_eq!(queue.scheduled_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_huge_retry_delay_parks_job_without_stranding_it() {
    let (store, queue) = setup();
    let job = FailingJob::default();
    queue.register_job(job.clone()).await;

    let record = queue
        .enqueue_opts::<FailingJob>(
            serde_json::Value::Null,
            EnqueueOptions::new()
                .max_retries(50)
                .retry_delay(Duration::from_secs(10_000_000_000_000)),
        )
        .await
        .unwrap();

    let outcome = queue.process_one("default").await.unwrap();
    assert_eq!(
        outcome,
        Some(ProcessOutcome::Retrying {
            attempt: 1,
            delay: vesper_jobs::MAX_BACKOFF,
        })
    );

    assert_eq!(queue.stats("default").await.unwrap().processing, 0);
    assert!(store
        .zscore(&queue.keys().scheduled(), &record.id)
        .await
        .unwrap()
        .is_some());
    let stored = queue.get_job(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Retrying);
    assert!(stored.scheduled_for.unwrap() > far_future());
}

#[tokio::test]
async fn test_sub_second_retry_delay_rounds_up() {
    let (_store, queue) = setup();

    let record = queue
        .enqueue_raw(
            "report.generate",
            serde_json::Value::Null,
            EnqueueOptions::new().retry_delay(Duration::from_millis(500)),
        )
        .await
        .unwrap();
    assert_eq!(record.retry_delay, 1);

    let record = queue
        .enqueue_raw(
            "report.generate",
            serde_json::Value::Null,
            EnqueueOptions::new().retry_delay(Duration::from_secs(3)),
        )
        .await
        .unwrap();
    assert_eq!(record.retry_delay, 3);
}
