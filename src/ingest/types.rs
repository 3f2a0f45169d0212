// src/ingest/types.rs
use anyhow::Result;

use crate::model::NewsItem;

/// Shape every fetcher must produce. Providers hand off normalized
/// `NewsItem`s; classification and activity are applied downstream by the
/// aggregation layer, never here.
#[async_trait::async_trait]
pub trait NewsProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>>;
    fn name(&self) -> &str;
}
