use std::time::Duration;
use vesper_store::{InMemoryStore, Store};

/// Behavior every backend must share. Keys are namespaced per run so the
/// suite can be pointed at a live Redis.
async fn check_contract(store: &dyn Store, ns: &str) {
    let key = |name: &str| format!("{ns}:{name}");

    // Strings and compare-and-mutate
    assert!(store
        .set_nx_ex(&key("lock"), "t1", Duration::from_secs(30))
        .await
        .unwrap());
    assert!(!store
        .set_nx_ex(&key("lock"), "t2", Duration::from_secs(30))
        .await
        .unwrap());
    assert!(!store.compare_and_delete(&key("lock"), "t2").await.unwrap());
    assert!(store
        .compare_and_extend(&key("lock"), "t1", Duration::from_secs(10))
        .await
        .unwrap());
    let ttl = store.ttl(&key("lock")).await.unwrap().unwrap();
    assert!(ttl > Duration::from_secs(30));
    assert!(store.compare_and_delete(&key("lock"), "t1").await.unwrap());
    assert_eq!(store.get(&key("lock")).await.unwrap(), None);

    // Lists in priority order
    let lists = vec![key("high"), key("normal"), key("low")];
    store.rpush(&key("low"), "l").await.unwrap();
    store.rpush(&key("normal"), "n").await.unwrap();
    let first = store
        .blpop(&lists, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(first, Some((key("normal"), "n".to_string())));
    let second = store
        .blpop(&lists, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(second, Some((key("low"), "l".to_string())));

    // Sorted set promotion
    store.zadd(&key("scheduled"), "job", 5.0).await.unwrap();
    assert_eq!(
        store
            .zrangebyscore(&key("scheduled"), 10.0, 10)
            .await
            .unwrap(),
        vec!["job"]
    );
    assert!(store
        .zmove_to_list(&key("scheduled"), "job", &key("high"))
        .await
        .unwrap());
    assert!(!store
        .zmove_to_list(&key("scheduled"), "job", &key("high"))
        .await
        .unwrap());
    assert_eq!(store.llen(&key("high")).await.unwrap(), 1);
    assert_eq!(store.lrem(&key("high"), "job").await.unwrap(), 1);

    // Sets
    assert!(store.sadd(&key("processing"), "job").await.unwrap());
    assert!(store.sismember(&key("processing"), "job").await.unwrap());
    assert_eq!(store.scard(&key("processing")).await.unwrap(), 1);
    assert!(store.srem(&key("processing"), "job").await.unwrap());
    assert_eq!(store.scard(&key("processing")).await.unwrap(), 0);

    // Settling moves out of the processing set
    store.sadd(&key("processing"), "a").await.unwrap();
    store.sadd(&key("processing"), "b").await.unwrap();
    store
        .smove_to_zset(&key("processing"), "a", &key("scheduled"), 7.0)
        .await
        .unwrap();
    store
        .smove_to_list(&key("processing"), "b", &key("dead"))
        .await
        .unwrap();
    assert_eq!(store.scard(&key("processing")).await.unwrap(), 0);
    assert_eq!(store.zscore(&key("scheduled"), "a").await.unwrap(), Some(7.0));
    assert_eq!(store.lrange(&key("dead"), 0, -1).await.unwrap(), vec!["b"]);
    store.del(&key("scheduled")).await.unwrap();
    store.del(&key("dead")).await.unwrap();

    // Sliding window
    let window = Duration::from_secs(60);
    for i in 0..2 {
        let outcome = store
            .sliding_window(&key("rl"), &format!("m{i}"), 1_000, window, 2, window)
            .await
            .unwrap();
        assert!(outcome.allowed);
    }
    let denied = store
        .sliding_window(&key("rl"), "m2", 1_000, window, 2, window)
        .await
        .unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.count, 2);
    store.del(&key("rl")).await.unwrap();
}

#[tokio::test]
async fn test_in_memory_store_contract() {
    let store = InMemoryStore::new();
    check_contract(&store, "contract").await;
}

#[tokio::test]
async fn test_in_memory_clones_share_state() {
    let a = InMemoryStore::new();
    let b = a.clone();

    a.rpush("shared", "x").await.unwrap();
    assert_eq!(b.llen("shared").await.unwrap(), 1);
}

#[cfg(feature = "redis")]
#[tokio::test]
#[ignore] // Requires a running Redis (VESPER_TEST_REDIS_URL)
async fn test_redis_store_contract() {
    let url = std::env::var("VESPER_TEST_REDIS_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let store = vesper_store::RedisStore::connect(&url).await.unwrap();
    let ns = format!("vesper-test:{}", std::process::id());
    check_contract(&store, &ns).await;
}
