// src/ingest/scheduler.rs
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use metrics::{counter, gauge};
use tokio::task::JoinHandle;

use crate::aggregate::commit_batches;
use crate::cache::NewsCache;
use crate::ingest::providers::telegram_file::TelegramFileProvider;
use crate::ingest::types::NewsProvider;
use crate::sources::SourceRegistry;

#[cfg(feature = "ingest-http")]
use crate::ingest::providers::rss_feed::RssFeedProvider;

pub const ENV_INGEST_INTERVAL_SECS: &str = "PULSEWATCH_INGEST_INTERVAL_SECS";
pub const ENV_TELEGRAM_DUMP_PATH: &str = "PULSEWATCH_TELEGRAM_FILE";
/// Matches the cache's fresh window, so entries are renewed as they age out.
pub const DEFAULT_INGEST_INTERVAL_SECS: u64 = 120;

#[derive(Clone, Debug)]
pub struct IngestSchedulerCfg {
    pub interval_secs: u64,
    pub telegram_dump_path: Option<PathBuf>,
}

impl IngestSchedulerCfg {
    pub fn from_env() -> Self {
        let interval_secs = std::env::var(ENV_INGEST_INTERVAL_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_INGEST_INTERVAL_SECS);
        let telegram_dump_path = std::env::var(ENV_TELEGRAM_DUMP_PATH)
            .ok()
            .map(PathBuf::from);
        Self {
            interval_secs,
            telegram_dump_path,
        }
    }
}

/// Spawn the periodic ingest task. Each tick takes a registry snapshot,
/// rebuilds the provider set from it (so source reloads apply on the next
/// tick), runs the pipeline, and commits the result. A tick that produced
/// nothing but errors leaves the cache untouched.
pub fn spawn_scheduler(
    cache: Arc<NewsCache>,
    registry: Arc<RwLock<SourceRegistry>>,
    cfg: IngestSchedulerCfg,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(cfg.interval_secs.max(1)));
        loop {
            ticker.tick().await;

            let snapshot = match registry.read() {
                Ok(guard) => guard.clone(),
                Err(e) => {
                    tracing::error!(target: "ingest", error = %e, "sources registry lock poisoned");
                    continue;
                }
            };

            let mut providers: Vec<Box<dyn NewsProvider>> = Vec::new();
            if let Some(path) = cfg.telegram_dump_path.clone() {
                providers.push(Box::new(TelegramFileProvider::from_path(
                    path,
                    snapshot.clone(),
                )));
            }
            #[cfg(feature = "ingest-http")]
            for spec in snapshot.feed_specs() {
                if let Some(p) = RssFeedProvider::from_spec(spec) {
                    providers.push(Box::new(p));
                }
            }
            if providers.is_empty() {
                tracing::debug!(target: "ingest", "no providers configured, skipping tick");
                continue;
            }

            let outcome = crate::ingest::run_once(&providers).await;
            let complete = outcome.provider_errors == 0;
            let kept = outcome.items.len();

            if kept == 0 && !complete {
                tracing::warn!(
                    target: "ingest",
                    errors = outcome.provider_errors,
                    "every provider failed, keeping prior cache entries"
                );
                continue;
            }
            commit_batches(&cache, outcome.items, complete);

            counter!("ingest_runs_total").increment(1);
            gauge!("ingest_pipeline_last_run_ts")
                .set(chrono::Utc::now().timestamp().max(0) as f64);

            tracing::info!(
                target: "ingest",
                kept,
                filtered = outcome.filtered,
                deduped = outcome.deduped,
                errors = outcome.provider_errors,
                complete,
                "ingest tick"
            );
        }
    })
}
