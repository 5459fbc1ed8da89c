use vesper_rs::prelude::*;

#[derive(Clone)]
struct GenerateDevotional;

#[derive(Debug, Serialize, Deserialize)]
struct DevotionalRequest {
    passage: String,
}

#[async_trait]
impl Job for GenerateDevotional {
    const NAME: &'static str = "ai.devotional";
    type Data = DevotionalRequest;

    async fn execute(
        &self,
        ctx: JobContext,
        data: DevotionalRequest,
    ) -> std::result::Result<serde_json::Value, HandlerError> {
        Ok(serde_json::json!({
            "tenant": ctx.tenant_id,
            "title": format!("Reflections on {}", data.passage),
        }))
    }
}

#[tokio::test]
async fn test_services_share_one_store() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let queue = JobQueue::new(store.clone());
    let lock = DistributedLock::new(store.clone());
    let limiter = RateLimiter::new(store.clone());
    queue.register_job(GenerateDevotional).await;

    let policy = RateLimitPolicy::per_minute(1);
    assert!(policy.check(&limiter, "tenant:7:ai").await.allowed);
    assert!(!policy.check(&limiter, "tenant:7:ai").await.allowed);

    let record = lock
        .with_lock("tenant:7:devotional", &LockOptions::default(), || async {
            queue
                .enqueue_opts::<GenerateDevotional>(
                    DevotionalRequest {
                        passage: "John 1".to_string(),
                    },
                    EnqueueOptions::new().tenant("7").priority(Priority::High),
                )
                .await
        })
        .await
        .unwrap()
        .expect("lock should be free")
        .unwrap();

    assert_eq!(
        queue.process_one("default").await.unwrap(),
        Some(ProcessOutcome::Completed)
    );
    let done = queue.get_job(&record.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(
        done.result,
        Some(serde_json::json!({ "tenant": "7", "title": "Reflections on John 1" }))
    );
}
