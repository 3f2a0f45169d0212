//! pulsewatch — binary entrypoint.
//! Boots the Axum HTTP server: routes, shared state, ingest scheduler,
//! metrics exporter.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pulsewatch::api::{create_router, AppState};
use pulsewatch::cache::{CachePolicy, NewsCache};
use pulsewatch::classify::{
    start_hot_reload_thread, ClassifierEngine, ClassifierHandle, DEFAULT_CLASSIFIER_CONFIG_PATH,
    ENV_CLASSIFIER_CONFIG_PATH,
};
use pulsewatch::ingest::scheduler::{spawn_scheduler, IngestSchedulerCfg};
use pulsewatch::metrics::Metrics;
use pulsewatch::sources::SourceRegistry;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pulsewatch=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    // --- Classifier: rule tables + optional hot reload ---
    let engine = ClassifierEngine::from_toml().context("loading classifier config")?;
    let classifier = ClassifierHandle::new(engine);
    let classifier_path = std::env::var(ENV_CLASSIFIER_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CLASSIFIER_CONFIG_PATH));
    start_hot_reload_thread(classifier.clone(), classifier_path);

    // --- Cache + metrics + sources ---
    let policy = CachePolicy::from_env();
    let metrics = Metrics::init(policy);
    let cache = Arc::new(NewsCache::new(policy));
    let registry = Arc::new(RwLock::new(SourceRegistry::load()));

    // --- Background ingest ---
    spawn_scheduler(
        cache.clone(),
        registry.clone(),
        IngestSchedulerCfg::from_env(),
    );

    let state = AppState::new(classifier, cache, registry);
    let app = create_router(state).merge(metrics.router());

    let addr: SocketAddr = std::env::var("PULSEWATCH_BIND")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()
        .context("parsing PULSEWATCH_BIND")?;
    tracing::info!(%addr, "pulsewatch listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding listen address")?;
    axum::serve(listener, app).await.context("serving http")?;
    Ok(())
}
