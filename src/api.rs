use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tower_http::cors::CorsLayer;

use crate::aggregate::{self, FeedQuery, FeedResponse};
use crate::briefing::{select_briefing_input, BriefingItem, DEFAULT_BRIEFING_CAP};
use crate::cache::{CacheDebugEntry, NewsCache};
use crate::classify::ClassifierHandle;
use crate::model::{Classification, Region, RegionActivity};
use crate::sources::{parse_tier, SourceRegistry};

#[derive(Clone)]
pub struct AppState {
    pub classifier: ClassifierHandle,
    pub cache: Arc<NewsCache>,
    pub registry: Arc<RwLock<SourceRegistry>>,
}

impl AppState {
    pub fn new(
        classifier: ClassifierHandle,
        cache: Arc<NewsCache>,
        registry: Arc<RwLock<SourceRegistry>>,
    ) -> Self {
        Self {
            classifier,
            cache,
            registry,
        }
    }

    /// Registry snapshot for one request, surviving a poisoned lock.
    fn registry_snapshot(&self) -> SourceRegistry {
        match self.registry.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/news", get(news))
        .route("/news/{region}", get(news_region))
        .route("/activity", get(activity))
        .route("/briefing/input", get(briefing_input))
        .route("/classify", post(classify))
        .route("/debug/cache", get(debug_cache))
        .route("/admin/reload-sources", post(admin_reload_sources))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct NewsQuery {
    region: Option<String>,
    tier: Option<String>,
}

fn parse_feed_query(
    region: Option<&str>,
    tier: Option<&str>,
) -> Result<FeedQuery, (StatusCode, String)> {
    let region = match region {
        Some(r) => Some(Region::parse(r).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("unknown region '{r}'"),
            )
        })?),
        None => None,
    };
    let tier = match tier {
        Some(t) => Some(parse_tier(t).ok_or_else(|| {
            (StatusCode::BAD_REQUEST, format!("unknown tier '{t}'"))
        })?),
        None => None,
    };
    Ok(FeedQuery { region, tier })
}

async fn news(
    State(state): State<AppState>,
    Query(q): Query<NewsQuery>,
) -> Result<Json<FeedResponse>, (StatusCode, String)> {
    let query = parse_feed_query(q.region.as_deref(), q.tier.as_deref())?;
    let registry = state.registry_snapshot();
    Ok(Json(aggregate::build_feed(
        &state.cache,
        &state.classifier,
        &registry,
        &query,
        Utc::now(),
    )))
}

async fn news_region(
    State(state): State<AppState>,
    Path(region): Path<String>,
) -> Result<Json<FeedResponse>, (StatusCode, String)> {
    let query = parse_feed_query(Some(&region), None)?;
    let registry = state.registry_snapshot();
    Ok(Json(aggregate::build_feed(
        &state.cache,
        &state.classifier,
        &registry,
        &query,
        Utc::now(),
    )))
}

async fn activity(State(state): State<AppState>) -> Json<HashMap<Region, RegionActivity>> {
    let registry = state.registry_snapshot();
    Json(aggregate::current_activity(
        &state.cache,
        &registry,
        Utc::now(),
    ))
}

async fn briefing_input(State(state): State<AppState>) -> Json<Vec<BriefingItem>> {
    let registry = state.registry_snapshot();
    let now = Utc::now();
    let feed = aggregate::build_feed(
        &state.cache,
        &state.classifier,
        &registry,
        &FeedQuery::default(),
        now,
    );
    Json(select_briefing_input(&feed.items, now, DEFAULT_BRIEFING_CAP))
}

#[derive(serde::Deserialize)]
struct ClassifyReq {
    text: String,
}

/// Debug surface for the rule tables: classify arbitrary text.
async fn classify(
    State(state): State<AppState>,
    Json(body): Json<ClassifyReq>,
) -> Json<Classification> {
    Json(state.classifier.classify(&body.text))
}

async fn debug_cache(State(state): State<AppState>) -> Json<Vec<CacheDebugEntry>> {
    Json(state.cache.debug_snapshot())
}

async fn admin_reload_sources(State(state): State<AppState>) -> String {
    let fresh = SourceRegistry::load();
    let version = fresh.version();
    match state.registry.write() {
        Ok(mut guard) => {
            *guard = fresh;
            format!("reloaded sources v{version}")
        }
        Err(_) => "failed: lock poisoned".to_string(),
    }
}
