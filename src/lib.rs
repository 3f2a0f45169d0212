// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod activity;
pub mod aggregate;
pub mod api;
pub mod briefing;
pub mod cache;
pub mod classify;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod sources;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::cache::{CacheKey, CachePolicy, Freshness, NewsCache};
pub use crate::classify::{ClassifierEngine, ClassifierHandle};
pub use crate::model::{NewsItem, Region, Tier};
pub use crate::sources::SourceRegistry;
