use axum::{routing::get, Router};
use metrics::{describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::cache::CachePolicy;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and publish the effective cache
    /// windows as static gauges, so a scrape shows which freshness policy
    /// the process booted with.
    pub fn init(policy: CachePolicy) -> Self {
        // Default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");

        describe_gauge!(
            "news_cache_fresh_window_secs",
            "Seconds a committed batch is served without a refetch"
        );
        describe_gauge!(
            "news_cache_stale_ceiling_secs",
            "Seconds after which a batch is evicted instead of served stale"
        );
        gauge!("news_cache_fresh_window_secs").set(policy.fresh_secs as f64);
        gauge!("news_cache_stale_ceiling_secs").set(policy.stale_ceiling_secs as f64);

        Self { handle }
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route("/metrics", get(move || std::future::ready(handle.render())))
    }
}
