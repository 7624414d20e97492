//! End-to-end scenarios driving the public API against the in-memory
//! backend, mirroring the six concrete scenarios spec.md lays out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilient_cache::backend::fake::FakeBackend;
use resilient_cache::{CacheBackend, CacheConfig, CoreError, ErrorMapper, ErrorMeta, ResilientCache};

fn config() -> CacheConfig {
    CacheConfig {
        ttl_default_secs: 60,
        ttl_negative_secs: 60,
        jitter_fraction: 0.05,
        max_pending: 256,
        fetch_timeout: Duration::from_millis(1_000),
    }
}

#[tokio::test]
async fn concurrent_cold_fill_invokes_fetcher_exactly_once() {
    let backend = Arc::new(FakeBackend::new());
    let cache = Arc::new(ResilientCache::new(backend.clone(), config()));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut joins = Vec::new();
    for _ in 0..100 {
        let cache = cache.clone();
        let calls = calls.clone();
        joins.push(tokio::spawn(async move {
            cache
                .get_or_fetch(
                    "k",
                    move |_cancel| {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(150)).await;
                            Ok(serde_json::json!({"a": 1}))
                        }
                    },
                    None,
                    None,
                )
                .await
        }));
    }

    for j in joins {
        let value = j.await.unwrap().unwrap();
        assert_eq!(*value, serde_json::json!({"a": 1}));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stored = backend.get("k").await.unwrap().expect("value should be cached");
    assert!(stored.contains("\"s\":true"));
    assert!(stored.contains("\"a\":1"));
}

#[tokio::test]
async fn cached_business_failure_replays_without_invoking_fetcher() {
    let backend = Arc::new(FakeBackend::new());
    backend
        .set_ex(
            "k",
            r#"{"s":false,"e":{"type":"InvalidCepError","message":"CEP not found","data":{"code":404}}}"#,
            60,
        )
        .await
        .unwrap();
    let cache = ResilientCache::new(backend, config());
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_for_fetcher = calls.clone();

    let result = cache
        .get_or_fetch(
            "k",
            move |_cancel| {
                calls_for_fetcher.fetch_add(1, Ordering::SeqCst);
                async { Ok(serde_json::Value::Null) }
            },
            None,
            None,
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    match result {
        Err(CoreError::CachedFailure { error_type, message, data }) => {
            assert_eq!(error_type, "InvalidCepError");
            assert_eq!(message, "CEP not found");
            assert_eq!(data, Some(serde_json::json!({"code": 404})));
        }
        other => panic!("expected CachedFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn system_error_passes_through_without_caching() {
    let backend = Arc::new(FakeBackend::new());
    let cache = ResilientCache::new(backend.clone(), config());

    let result = cache
        .get_or_fetch(
            "k",
            |_cancel| async { Err(CoreError::System("Network failure".to_string())) },
            None,
            None,
        )
        .await;

    match result {
        Err(CoreError::System(msg)) => assert_eq!(msg, "Network failure"),
        other => panic!("expected System error, got {other:?}"),
    }
    assert_eq!(backend.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn corrupted_success_envelope_raises_without_invoking_fetcher() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_ex("k", r#"{"s":true}"#, 60).await.unwrap();
    let cache = ResilientCache::new(backend, config());
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_for_fetcher = calls.clone();

    let result = cache
        .get_or_fetch(
            "k",
            move |_cancel| {
                calls_for_fetcher.fetch_add(1, Ordering::SeqCst);
                async { Ok(serde_json::json!({})) }
            },
            None,
            None,
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(matches!(result, Err(CoreError::CorruptedCache)));
}

#[tokio::test]
async fn fetch_timeout_raises_with_no_write_and_empty_table_afterward() {
    let backend = Arc::new(FakeBackend::new());
    let mut cfg = config();
    cfg.fetch_timeout = Duration::from_millis(200);
    let cache = ResilientCache::new(backend.clone(), cfg);

    let result = cache
        .get_or_fetch(
            "k",
            |_cancel| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(serde_json::json!({"never": "written"}))
            },
            None,
            None,
        )
        .await;

    assert!(matches!(result, Err(CoreError::FetchTimeout)));
    assert_eq!(backend.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn negative_cache_is_idempotent_within_the_negative_ttl() {
    let backend = Arc::new(FakeBackend::new());
    let cache = ResilientCache::new(backend, config());
    let calls = Arc::new(AtomicUsize::new(0));

    let mapper: Arc<ErrorMapper> = Arc::new(|err: &CoreError| -> Option<ErrorMeta> {
        match err {
            CoreError::System(msg) if msg == "not found upstream" => Some(ErrorMeta {
                error_type: "CoordinatesNotFound".to_string(),
                message: "no coordinates".to_string(),
                data: None,
            }),
            _ => None,
        }
    });

    for _ in 0..3 {
        let calls = calls.clone();
        let mapper = mapper.clone();
        let result = cache
            .get_or_fetch(
                "k",
                move |_cancel| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(CoreError::System("not found upstream".to_string())) }
                },
                Some(mapper),
                None,
            )
            .await;
        assert!(matches!(result, Err(CoreError::CachedFailure { .. })));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1, "fetcher should only run on the first miss");
}
