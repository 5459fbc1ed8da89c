use futures_util::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vesper_extras::lock::{DistributedLock, LockOptions};
use vesper_extras::rate_limit::RateLimiter;
use vesper_store::{InMemoryStore, Store};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_limiter_admits_at_most_limit_under_concurrency() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    // Two limiter instances over one store, like two application processes
    let a = RateLimiter::new(store.clone());
    let b = RateLimiter::new(store);

    let checks = (0..50).map(|i| {
        let limiter = if i % 2 == 0 { a.clone() } else { b.clone() };
        tokio::spawn(async move {
            limiter
                .check("tenant:42:ai", 10, Duration::from_secs(60))
                .await
                .allowed
        })
    });

    let allowed = join_all(checks)
        .await
        .into_iter()
        .filter(|r| *r.as_ref().unwrap())
        .count();
    assert_eq!(allowed, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lock_provides_mutual_exclusion() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let entered = Arc::new(AtomicUsize::new(0));

    let opts = LockOptions::new()
        .blocking(Duration::from_secs(10))
        .retry_interval(Duration::from_millis(5));

    let tasks = (0..8).map(|_| {
        let lock = DistributedLock::new(store.clone());
        let (inside, entered, opts) = (inside.clone(), entered.clone(), opts.clone());
        tokio::spawn(async move {
            lock.with_lock("ledger", &opts, || async {
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "two holders at once");
                tokio::time::sleep(Duration::from_millis(10)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                entered.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap()
        })
    });

    for result in join_all(tasks).await {
        assert!(result.unwrap().is_some());
    }
    assert_eq!(entered.load(Ordering::SeqCst), 8);
}
