//! Worker process demo
//!
//! Runs a scheduler and a worker pool against a shared store, enqueues a few
//! webhook deliveries (the first attempt of each fails, to show retries) and a
//! nightly report guarded by a distributed lock, then waits for Ctrl+C.
//!
//! Run with:
//!
//! ```text
//! cargo run -p worker-demo
//! REDIS_URL=redis://127.0.0.1/ VESPER_LOG_FORMAT=json cargo run -p worker-demo
//! ```

use vesper_rs::extras::config::{env_or, env_parse};
use vesper_rs::prelude::*;

#[derive(Clone)]
struct DeliverWebhook;

#[derive(Debug, Serialize, Deserialize)]
struct Webhook {
    url: String,
    event: String,
}

#[async_trait]
impl Job for DeliverWebhook {
    const NAME: &'static str = "webhook.deliver";
    type Data = Webhook;

    async fn execute(
        &self,
        ctx: JobContext,
        hook: Webhook,
    ) -> std::result::Result<serde_json::Value, HandlerError> {
        if ctx.attempt == 1 {
            return Err(HandlerError::new(format!("{} timed out", hook.url)));
        }
        tracing::info!(job_id = %ctx.job_id, event = %hook.event, "Webhook delivered");
        Ok(serde_json::json!({ "status": 204 }))
    }
}

#[derive(Clone)]
struct NightlyReport {
    lock: DistributedLock,
}

#[async_trait]
impl Job for NightlyReport {
    const NAME: &'static str = "report.nightly";
    type Data = serde_json::Value;

    async fn execute(
        &self,
        ctx: JobContext,
        _data: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, HandlerError> {
        let opts = LockOptions::new().timeout(Duration::from_secs(60));
        let ran = self
            .lock
            .with_lock("report.nightly", &opts, || async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                tracing::info!(job_id = %ctx.job_id, "Nightly report generated");
            })
            .await
            .map_err(|e| HandlerError::with_source("could not take report lock", e))?;

        Ok(serde_json::json!({ "generated": ran.is_some() }))
    }
}

async fn connect_store() -> Result<Arc<dyn Store>, StoreError> {
    match std::env::var("REDIS_URL") {
        Ok(url) => {
            tracing::info!(url = %url, "Using Redis store");
            Ok(Arc::new(RedisStore::connect(&url).await?))
        }
        Err(_) => {
            tracing::info!("REDIS_URL not set, using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    load_dotenv();
    let env = Environment::current();

    let format = env_parse::<LogFormat>("VESPER_LOG_FORMAT").unwrap_or(if env.is_production() {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });
    init_logging(
        &LoggingConfig::new()
            .format(format)
            .filter(env.default_log_level()),
    )?;

    let queue_config = Config::<QueueConfig>::from_env_prefixed("VESPER_QUEUE")?.into_inner();
    let queue_name = env_or("VESPER_DEMO_QUEUE", &queue_config.default_queue);
    tracing::info!(environment = %env, queue = %queue_name, "Starting worker demo");

    let store = connect_store().await?;
    let queue = JobQueue::with_config(store.clone(), queue_config.clone())?;
    let lock = DistributedLock::with_prefix(store.clone(), queue_config.key_prefix.clone());
    let limiter = RateLimiter::with_prefix(store.clone(), queue_config.key_prefix.clone());

    queue.register_job(DeliverWebhook).await;
    queue.register_job(NightlyReport { lock: lock.clone() }).await;

    let shutdown = Shutdown::new();
    let scheduler = Scheduler::spawn_with_shutdown(queue.clone(), shutdown.clone());
    let workers = WorkerPool::start_with_shutdown(
        queue.clone(),
        queue_name.clone(),
        queue_config.workers,
        shutdown.clone(),
    )?;

    // Per-tenant throttle on outbound webhooks
    let webhook_policy = RateLimitPolicy::per_second(3);
    let events = [
        "member.created",
        "donation.received",
        "devotional.published",
        "member.updated",
    ];
    for (i, event) in events.into_iter().enumerate() {
        let info = webhook_policy.check(&limiter, "tenant:demo:webhooks").await;
        if !info.allowed {
            tracing::warn!(event, retry_after = ?info.retry_after, "Webhook throttled");
            continue;
        }
        queue
            .enqueue_opts::<DeliverWebhook>(
                Webhook {
                    url: format!("https://hooks.example.com/{i}"),
                    event: event.to_string(),
                },
                EnqueueOptions::new()
                    .queue(queue_name.clone())
                    .tenant("demo")
                    .priority(Priority::High)
                    .retry_delay(Duration::from_secs(1)),
            )
            .await?;
    }

    queue
        .enqueue_opts::<NightlyReport>(
            serde_json::Value::Null,
            EnqueueOptions::new()
                .queue(queue_name.clone())
                .priority(Priority::Low)
                .delay(Duration::from_secs(2)),
        )
        .await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match queue.stats(&queue_name).await {
                    Ok(stats) => tracing::info!(
                        high = stats.pending.high,
                        normal = stats.pending.normal,
                        low = stats.pending.low,
                        processing = stats.processing,
                        dead = stats.dead,
                        "Queue stats"
                    ),
                    Err(e) => tracing::warn!(error = %e, "Could not read queue stats"),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }

    tracing::info!("Shutting down, waiting for in-flight jobs");
    shutdown.trigger();
    workers.shutdown().await?;
    scheduler.shutdown().await?;
    Ok(())
}
