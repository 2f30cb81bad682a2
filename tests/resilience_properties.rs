//! End-to-end behavior of the query layer through its public API.

use futures_util::future::BoxFuture;
use resilient_query::cache::{JsonFileStore, MemoryStore, PersistentStore};
use resilient_query::query::{BatchOptions, QueryOptions};
use resilient_query::resilience::{CircuitBreaker, CircuitState};
use resilient_query::{FetchOptions, QueryError, QueryResult};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

mod common;
use common::MockBackend;

#[tokio::test]
async fn test_concurrent_fetches_share_one_call() {
    let ctx = Arc::new(common::context_over(None));
    let backend = MockBackend::returning(json!({"members": 12})).with_delay(Duration::from_millis(50));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let ctx = ctx.clone();
            let fetch = backend.fetch();
            tokio::spawn(async move {
                ctx.manager
                    .get_cached_or_fetch::<Value, _, _>("schedule_week_42", fetch, FetchOptions::default())
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), json!({"members": 12}));
    }
    assert_eq!(backend.calls(), 1);
    assert_eq!(ctx.deduplicator.active_count(), 0);
}

#[tokio::test]
async fn test_shared_failure_reaches_every_caller() {
    let ctx = Arc::new(common::context_over(None));
    let backend = MockBackend::returning(json!(null))
        .always_failing()
        .with_delay(Duration::from_millis(20));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let ctx = ctx.clone();
            let fetch = backend.fetch();
            tokio::spawn(async move {
                ctx.manager
                    .get_cached_or_fetch::<Value, _, _>("schedule_1", fetch, FetchOptions::default())
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap_err().to_string(), "connection refused");
    }
    assert_eq!(backend.calls(), 1);
    assert_eq!(ctx.database.stats().failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cache_entry_expires_after_ttl() {
    let ctx = common::context_over(None);
    let backend = MockBackend::returning(json!(7));
    let options = QueryOptions::default().ttl(Duration::from_millis(100));

    ctx.batcher.execute("dashboard_summary", backend.fetch(), options.clone()).await.unwrap();

    tokio::time::advance(Duration::from_millis(50)).await;
    ctx.batcher.execute("dashboard_summary", backend.fetch(), options.clone()).await.unwrap();
    assert_eq!(backend.calls(), 1);

    tokio::time::advance(Duration::from_millis(100)).await;
    assert_eq!(ctx.batcher.stats().cache.expired, 1);
    ctx.batcher.execute("dashboard_summary", backend.fetch(), options).await.unwrap();
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_state_machine() {
    let breaker = CircuitBreaker::new("Database", common::fast_breaker());
    let failing = MockBackend::returning(json!(null)).always_failing();
    let healthy = MockBackend::returning(json!("ok"));

    for _ in 0..3 {
        assert!(breaker.execute(failing.fetch()).await.is_err());
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let rejected = breaker.execute(healthy.fetch()).await.unwrap_err();
    assert!(rejected.is_circuit_open());
    assert_eq!(healthy.calls(), 0);

    tokio::time::advance(Duration::from_millis(1_000)).await;
    assert_eq!(breaker.execute(healthy.fetch()).await.unwrap(), json!("ok"));
    assert_eq!(breaker.state(), CircuitState::Closed);

    let stats = breaker.stats();
    assert_eq!(stats.total_requests, 5);
    assert_eq!(stats.failure_count, 0);
    assert!(stats.last_failure_time.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens() {
    let breaker = CircuitBreaker::new("COODashboard", common::fast_breaker());
    let failing = MockBackend::returning(json!(null)).always_failing();

    for _ in 0..3 {
        let _ = breaker.execute(failing.fetch()).await;
    }
    tokio::time::advance(Duration::from_millis(1_000)).await;

    assert!(breaker.execute(failing.fetch()).await.is_err());
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(failing.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_timeout_counts_as_failure() {
    let breaker = CircuitBreaker::new("Database", common::fast_breaker());
    let slow = MockBackend::returning(json!(1)).with_delay(Duration::from_secs(10));

    let started = Instant::now();
    let err = breaker.execute(slow.fetch()).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout());
    assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(600));
    assert_eq!(breaker.stats().failure_count, 1);
}

#[tokio::test]
async fn test_static_data_survives_restart() {
    let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
    let backend = MockBackend::returning(json!([{"id": 1, "name": "Ops"}]));

    let first = common::manager_over(Arc::clone(&store));
    let teams: Value = first
        .get_cached_or_fetch("teams_all", backend.fetch(), FetchOptions::default())
        .await
        .unwrap();

    let restarted = common::manager_over(store);
    let unreachable = MockBackend::returning(json!(null)).always_failing();
    let cached: Value = restarted
        .get_cached_or_fetch("teams_all", unreachable.fetch(), FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(teams, cached);
    assert_eq!(unreachable.calls(), 0);
    // The persisted hit is not copied into memory.
    assert_eq!(restarted.cache_stats().total, 0);
}

#[tokio::test]
async fn test_static_data_survives_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("query_cache.json");
    let backend = MockBackend::returning(json!({"sprint": 12}));

    {
        let store: Arc<dyn PersistentStore> = Arc::new(JsonFileStore::open(&path, 100).unwrap());
        let manager = common::manager_over(store);
        let _: Value = manager
            .get_cached_or_fetch("global_sprint", backend.fetch(), FetchOptions::default())
            .await
            .unwrap();
        let _: Value = manager
            .get_cached_or_fetch("schedule_today", backend.fetch(), FetchOptions::default())
            .await
            .unwrap();
    }

    let store = JsonFileStore::open(&path, 100).unwrap();
    assert_eq!(store.keys().unwrap(), vec!["cache_global_sprint".to_string()]);

    let manager = common::manager_over(Arc::new(store));
    let sprint: Value = manager
        .get_cached_or_fetch("global_sprint", backend.fetch(), FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(sprint, json!({"sprint": 12}));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_batch_partial_failure() {
    let ctx = common::context_over(None);
    let ok = MockBackend::returning(json!(["a"]));
    let broken = MockBackend::returning(json!(null)).always_failing();

    let queries: Vec<(&str, BoxFuture<'static, QueryResult<Value>>)> = vec![
        ("teams", ok.fetch()()),
        ("members", ok.fetch()()),
        ("dashboard", broken.fetch()()),
    ];
    let outcome = ctx
        .batcher
        .batch_execute(queries, BatchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.errors.len(), 1);
    assert!(matches!(outcome.errors["dashboard"], QueryError::Message(_)));
}

#[tokio::test]
async fn test_retries_recover_from_transient_errors() {
    let ctx = common::context_over(None);
    let flaky = MockBackend::returning(json!("done")).failing_first(2);

    let value = ctx
        .with_retries("load_members", || flaky.fetch()())
        .await
        .unwrap();
    assert_eq!(value, json!("done"));
    assert_eq!(flaky.calls(), 3);
}
