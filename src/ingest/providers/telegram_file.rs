// src/ingest/providers/telegram_file.rs
//! Reads the JSON document the Telegram fetch script emits:
//! `{fetched_at, channel_count, post_count, posts: [...]}`. Each post carries
//! the channel's own region/tier/confidence claims; the registry overrides
//! them for handles it knows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;
use std::path::PathBuf;

use crate::ingest::types::NewsProvider;
use crate::ingest::{normalize_text, split_title};
use crate::model::{NewsItem, Region, Source, Tier};
use crate::sources::{parse_tier, SourceRegistry};

#[derive(Debug, Deserialize)]
struct Dump {
    #[serde(default)]
    posts: Vec<RawPost>,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: String,
    #[serde(default)]
    platform: Option<String>,
    handle: String,
    region: String,
    #[serde(default)]
    confidence: Option<u8>,
    #[serde(default)]
    tier: Option<String>,
    text: String,
    timestamp: String,
    #[serde(default)]
    url: Option<String>,
}

/// The script emits RFC 3339 with an offset for post timestamps and a naive
/// ISO string for `fetched_at`; accept both, always as UTC.
fn parse_timestamp_utc(ts: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub struct TelegramFileProvider {
    registry: SourceRegistry,
    mode: Mode,
}

enum Mode {
    Path(PathBuf),
    Fixture(String),
}

impl TelegramFileProvider {
    pub fn from_path(path: PathBuf, registry: SourceRegistry) -> Self {
        Self {
            registry,
            mode: Mode::Path(path),
        }
    }

    /// Parse from an in-memory dump, used by tests and by callers that
    /// already read the file themselves.
    pub fn from_fixture_str(raw: &str, registry: SourceRegistry) -> Self {
        Self {
            registry,
            mode: Mode::Fixture(raw.to_string()),
        }
    }

    fn parse_dump(&self, raw: &str) -> Result<Vec<NewsItem>> {
        let t0 = std::time::Instant::now();
        let dump: Dump = serde_json::from_str(raw).context("parsing telegram dump json")?;

        let mut out = Vec::with_capacity(dump.posts.len());
        for post in dump.posts {
            let Some(region) = Region::parse(&post.region) else {
                tracing::warn!(
                    target: "ingest",
                    region = %post.region,
                    "skipping post with unknown region"
                );
                counter!("ingest_filtered_total").increment(1);
                continue;
            };
            let Some(timestamp) = parse_timestamp_utc(&post.timestamp) else {
                tracing::warn!(
                    target: "ingest",
                    id = %post.id,
                    ts = %post.timestamp,
                    "skipping post with unparseable timestamp"
                );
                counter!("ingest_filtered_total").increment(1);
                continue;
            };

            let text = normalize_text(&post.text);
            if text.is_empty() {
                counter!("ingest_filtered_total").increment(1);
                continue;
            }
            let (title, content) = split_title(&text);

            let platform = post
                .platform
                .clone()
                .unwrap_or_else(|| "telegram".to_string());
            // Registry entries are authoritative; the dump's own tier and
            // confidence only stand in for handles the registry never saw.
            let source = match self.registry.lookup(&post.handle) {
                Some(spec) => Source {
                    name: spec.handle.clone(),
                    platform: spec.platform.clone(),
                    tier: spec.tier,
                    confidence: spec.confidence,
                },
                None => Source {
                    name: post.handle.trim_start_matches('@').to_string(),
                    platform,
                    tier: post
                        .tier
                        .as_deref()
                        .and_then(parse_tier)
                        .unwrap_or(Tier::Ground),
                    confidence: post
                        .confidence
                        .unwrap_or_else(|| self.registry.default_confidence()),
                },
            };

            out.push(NewsItem {
                id: post.id,
                title,
                content,
                source,
                timestamp,
                region,
                url: post.url.unwrap_or_default(),
                verification_status: Default::default(),
                is_breaking: false,
                event_signal: None,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_posts_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl NewsProvider for TelegramFileProvider {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
        match &self.mode {
            Mode::Fixture(raw) => self.parse_dump(raw),
            Mode::Path(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading telegram dump {}", path.display()))?;
                self.parse_dump(&raw)
            }
        }
    }

    fn name(&self) -> &str {
        "telegram-file"
    }
}
