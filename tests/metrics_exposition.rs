// tests/metrics_exposition.rs
//
// Scrapes /metrics after driving one ingest cycle and a cache miss/hit
// pair through the pipeline. The Prometheus recorder installs once per
// process, so everything lives in a single test.

use std::sync::{Arc, RwLock};

use axum::{
    body::{self, Body},
    http::Request,
};
use http::StatusCode;
use tower::ServiceExt as _;

use pulsewatch::aggregate::commit_batches;
use pulsewatch::api::{create_router, AppState};
use pulsewatch::cache::{CacheKey, CachePolicy, NewsCache};
use pulsewatch::classify::{ClassifierEngine, ClassifierHandle};
use pulsewatch::ingest::providers::telegram_file::TelegramFileProvider;
use pulsewatch::ingest::run_once;
use pulsewatch::ingest::types::NewsProvider;
use pulsewatch::metrics::Metrics;
use pulsewatch::model::Region;
use pulsewatch::sources::SourceRegistry;

const TELEGRAM_DUMP: &str = r#"{
  "fetched_at": "2026-08-20T10:30:00.000000",
  "channel_count": 1,
  "post_count": 1,
  "posts": [
    {
      "id": "telegram-DeepStateUA-7",
      "platform": "telegram",
      "handle": "DeepStateUA",
      "region": "europe-russia",
      "confidence": 92,
      "tier": "official",
      "text": "Shelling reported along the northern axis overnight.",
      "timestamp": "2026-08-20T10:12:00+00:00",
      "url": "https://t.me/DeepStateUA/7"
    }
  ]
}"#;

#[tokio::test]
async fn metrics_endpoint_exposes_pipeline_series() {
    let policy = CachePolicy::default();
    let metrics = Metrics::init(policy);

    // Miss first, then commit one cycle, then hit: both counters move.
    let cache = Arc::new(NewsCache::new(policy));
    assert!(cache.get(&CacheKey::Region(Region::EuropeRussia)).is_none());

    let registry = SourceRegistry::load();
    let providers: Vec<Box<dyn NewsProvider>> = vec![Box::new(
        TelegramFileProvider::from_fixture_str(TELEGRAM_DUMP, registry.clone()),
    )];
    let outcome = run_once(&providers).await;
    assert_eq!(outcome.provider_errors, 0);
    commit_batches(&cache, outcome.items, true);
    assert!(cache.get(&CacheKey::Region(Region::EuropeRussia)).is_some());

    let engine = ClassifierEngine::from_toml_str(include_str!("../config/classifier.toml"))
        .expect("shipped classifier config");
    let state = AppState::new(
        ClassifierHandle::new(engine),
        cache,
        Arc::new(RwLock::new(registry)),
    );
    let app = create_router(state).merge(metrics.router());

    let req = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .expect("build GET /metrics");
    let resp = app.oneshot(req).await.expect("oneshot /metrics");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .expect("read body")
        .to_vec();
    let text = String::from_utf8(bytes).expect("utf8 exposition");

    // Series names only; the exporter decides the histogram rendering.
    for series in [
        "news_cache_fresh_window_secs",
        "news_cache_stale_ceiling_secs",
        "cache_misses_total",
        "cache_hits_total",
        "ingest_posts_total",
        "ingest_kept_total",
        "ingest_parse_ms",
    ] {
        assert!(text.contains(series), "missing series '{series}' in:\n{text}");
    }

    // The boot gauges carry the default policy values.
    assert!(text.contains("news_cache_fresh_window_secs 120"));
    assert!(text.contains("news_cache_stale_ceiling_secs 1800"));
}
