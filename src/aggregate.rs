// src/aggregate.rs
//! Aggregation and dedup: reconcile cache reads and fresh batches into one
//! canonical feed, annotate items with classification results, and attach
//! per-region activity. The canonical `NewsItem` keeps only its derived
//! fields; full classification rides along as display metadata.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::activity::compute_activity;
use crate::cache::{merge_newest, sort_by_recency, CacheKey, Freshness, NewsCache};
use crate::classify::ClassifierHandle;
use crate::model::{
    Classification, ContentType, NewsItem, Region, RegionActivity, Tier,
};
use crate::sources::SourceRegistry;

/// A feed item plus its per-request classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedItem {
    #[serde(flatten)]
    pub item: NewsItem,
    pub classification: Classification,
}

/// The boundary contract: deduplicated items, per-region activity, and
/// enough freshness metadata that stale or partial data is never silently
/// presented as fresh and whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub items: Vec<AnnotatedItem>,
    pub activity: HashMap<Region, RegionActivity>,
    pub fetched_at: DateTime<Utc>,
    pub total_items: usize,
    pub is_complete: bool,
    pub stale: bool,
}

/// Requested slice of the feed. The cache key space stays {region} ∪
/// {all+tier}; a region+tier combination is served from the region key and
/// tier-filtered per request without creating a new key shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedQuery {
    pub region: Option<Region>,
    pub tier: Option<Tier>,
}

impl FeedQuery {
    pub fn cache_key(&self) -> CacheKey {
        match (self.region, self.tier) {
            (Some(region), _) if region != Region::All => CacheKey::Region(region),
            (_, Some(tier)) => CacheKey::AllTier(tier),
            _ => CacheKey::Region(Region::All),
        }
    }
}

/// Fold any number of batches into one deduplicated, recency-ordered list.
/// Batches are consumed in order, so earlier batches are the "first seen"
/// side of timestamp ties.
pub fn reconcile<I>(batches: I) -> Vec<NewsItem>
where
    I: IntoIterator<Item = Vec<NewsItem>>,
{
    let mut merged: Vec<NewsItem> = Vec::new();
    for batch in batches {
        merge_newest(&mut merged, &batch);
    }
    sort_by_recency(&mut merged);
    merged
}

/// Classify each item and derive its item-level fields. An axis only writes
/// through to the item when its confidence clears the classifier's floor;
/// low-confidence results stay display-only.
pub fn annotate(items: Vec<NewsItem>, classifier: &ClassifierHandle) -> Vec<AnnotatedItem> {
    let floor = classifier.min_confidence();
    items
        .into_iter()
        .map(|mut item| {
            let classification = classifier.classify(item.body());
            if classification.verification.confidence >= floor {
                item.verification_status = classification.verification.label;
            }
            if classification.content_type.confidence >= floor {
                item.is_breaking = classification.content_type.label == ContentType::Breaking;
            }
            AnnotatedItem {
                item,
                classification,
            }
        })
        .collect()
}

/// Commit one complete fetch cycle: the full union lands under `all` first,
/// then per-region slices (which merge into the fresh aggregate as they
/// write). Partial pipelines must not call this; `is_complete=false` marks
/// a cycle that lost one or more providers.
pub fn commit_batches(cache: &NewsCache, items: Vec<NewsItem>, is_complete: bool) {
    let mut by_region: HashMap<Region, Vec<NewsItem>> = HashMap::new();
    for item in &items {
        if item.region != Region::All {
            by_region.entry(item.region).or_default().push(item.clone());
        }
    }
    cache.set(CacheKey::Region(Region::All), items, is_complete);
    for (region, batch) in by_region {
        cache.set(CacheKey::Region(region), batch, is_complete);
    }
}

/// Commit one region's complete batch.
pub fn refresh_region(cache: &NewsCache, region: Region, batch: Vec<NewsItem>) -> usize {
    let count = batch.len();
    cache.set(CacheKey::Region(region), batch, true);
    count
}

/// Assemble the feed for one query from whatever the cache holds. A miss on
/// the requested key degrades to the merged view of the remaining live keys
/// (marked incomplete) instead of failing.
pub fn build_feed(
    cache: &NewsCache,
    classifier: &ClassifierHandle,
    registry: &SourceRegistry,
    query: &FeedQuery,
    now: DateTime<Utc>,
) -> FeedResponse {
    let key = query.cache_key();

    let (items, fetched_at, is_complete, stale) = match cache.get(&key) {
        Some((entry, freshness)) => (
            entry.items,
            entry.fetched_at,
            entry.is_complete,
            freshness == Freshness::Stale,
        ),
        None => match key {
            // A tier view can be rebuilt from the aggregate and cached for
            // the next read under its own key. It carries the aggregate's
            // clock, so it goes stale exactly when its parent does.
            CacheKey::AllTier(tier) => match cache.get(&CacheKey::Region(Region::All)) {
                Some((all, freshness)) => {
                    let filtered: Vec<NewsItem> = all
                        .items
                        .iter()
                        .filter(|i| i.source.tier == tier)
                        .cloned()
                        .collect();
                    cache.set_derived(key, filtered.clone(), &all);
                    (
                        filtered,
                        all.fetched_at,
                        all.is_complete,
                        freshness == Freshness::Stale,
                    )
                }
                None => (cache.get_all(), now, false, true),
            },
            _ => (cache.get_all(), now, false, true),
        },
    };

    // Activity always reflects the aggregate view, not the queried slice,
    // so a filtered feed still carries region-level context.
    let aggregate_items = match key {
        CacheKey::Region(Region::All) => items.clone(),
        _ => match cache.get(&CacheKey::Region(Region::All)) {
            Some((entry, _)) => entry.items,
            None => cache.get_all(),
        },
    };
    let cutoff = now - Duration::hours(registry.window_hours() as i64);
    let window_items: Vec<NewsItem> = aggregate_items
        .into_iter()
        .filter(|i| i.timestamp >= cutoff)
        .collect();
    let activity = compute_activity(
        &window_items,
        &registry.baselines(registry.window_hours()),
        &registry.thresholds(),
    );

    let served: Vec<NewsItem> = items
        .into_iter()
        .filter(|i| match query.region {
            Some(region) if region != Region::All => i.region == region,
            _ => true,
        })
        .filter(|i| match query.tier {
            Some(tier) => i.source.tier == tier,
            None => true,
        })
        .collect();

    let annotated = annotate(served, classifier);
    let total_items = annotated.len();
    FeedResponse {
        items: annotated,
        activity,
        fetched_at,
        total_items,
        is_complete,
        stale,
    }
}

/// Per-region activity over the standard window, computed from the
/// aggregate view. Backing for the /activity endpoint.
pub fn current_activity(
    cache: &NewsCache,
    registry: &SourceRegistry,
    now: DateTime<Utc>,
) -> HashMap<Region, RegionActivity> {
    let items = match cache.get(&CacheKey::Region(Region::All)) {
        Some((entry, _)) => entry.items,
        None => cache.get_all(),
    };
    let cutoff = now - Duration::hours(registry.window_hours() as i64);
    let window_items: Vec<NewsItem> = items
        .into_iter()
        .filter(|i| i.timestamp >= cutoff)
        .collect();
    compute_activity(
        &window_items,
        &registry.baselines(registry.window_hours()),
        &registry.thresholds(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::classify::ClassifierEngine;
    use crate::model::{Source, VerificationStatus};
    use chrono::TimeZone;

    fn classifier() -> ClassifierHandle {
        ClassifierHandle::new(ClassifierEngine::from_toml().expect("default config"))
    }

    fn registry() -> SourceRegistry {
        SourceRegistry::default_seed()
    }

    fn item(id: &str, minute: u32, region: Region, title: &str) -> NewsItem {
        NewsItem {
            id: id.into(),
            title: title.into(),
            content: None,
            source: Source {
                name: "chan".into(),
                platform: "telegram".into(),
                tier: Tier::Osint,
                confidence: 80,
            },
            timestamp: Utc.with_ymd_and_hms(2026, 8, 20, 10, minute, 0).unwrap(),
            region,
            url: format!("https://t.me/chan/{id}"),
            verification_status: Default::default(),
            is_breaking: false,
            event_signal: None,
        }
    }

    #[test]
    fn reconcile_dedups_newer_wins_and_sorts() {
        let first = vec![
            item("1", 10, Region::EuropeRussia, "first copy"),
            item("2", 12, Region::EuropeRussia, "post two"),
        ];
        let second = vec![
            item("1", 15, Region::EuropeRussia, "newer copy"),
            item("3", 16, Region::EuropeRussia, "post three"),
        ];
        let merged = reconcile([first, second]);
        let ids: Vec<&str> = merged.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
        assert_eq!(merged[1].title, "newer copy");
    }

    #[test]
    fn annotate_derives_fields_only_above_floor() {
        let c = classifier();
        let items = vec![
            item("1", 10, Region::EuropeRussia, "BREAKING: strikes confirmed near Kharkiv"),
            item("2", 11, Region::EuropeRussia, "Quiet morning market update"),
        ];
        let annotated = annotate(items, &c);

        assert!(annotated[0].item.is_breaking);
        assert_eq!(
            annotated[0].item.verification_status,
            VerificationStatus::Confirmed
        );
        // Nothing matched: defaults survive, classification rides along.
        assert!(!annotated[1].item.is_breaking);
        assert_eq!(
            annotated[1].item.verification_status,
            VerificationStatus::Unverified
        );
        assert_eq!(annotated[1].classification.content_type.confidence, 0.0);
    }

    #[test]
    fn build_feed_serves_region_slice() {
        let cache = NewsCache::new(CachePolicy::default());
        commit_batches(
            &cache,
            vec![
                item("1", 10, Region::EuropeRussia, "post one"),
                item("2", 12, Region::MiddleEast, "post two"),
            ],
            true,
        );

        let feed = build_feed(
            &cache,
            &classifier(),
            &registry(),
            &FeedQuery {
                region: Some(Region::MiddleEast),
                tier: None,
            },
            Utc.with_ymd_and_hms(2026, 8, 20, 11, 0, 0).unwrap(),
        );
        assert_eq!(feed.total_items, 1);
        assert_eq!(feed.items[0].item.id, "2");
        assert!(feed.is_complete);
        assert!(!feed.stale);
        // Activity still covers the whole watchlist.
        assert_eq!(feed.activity.len(), Region::watchlist().len());
    }

    #[test]
    fn build_feed_populates_tier_key_from_aggregate() {
        let cache = NewsCache::new(CachePolicy::default());
        let mut official = item("1", 10, Region::EuropeRussia, "official post");
        official.source.tier = Tier::Official;
        commit_batches(
            &cache,
            vec![official, item("2", 12, Region::MiddleEast, "osint post")],
            true,
        );

        let query = FeedQuery {
            region: None,
            tier: Some(Tier::Official),
        };
        let feed = build_feed(
            &cache,
            &classifier(),
            &registry(),
            &query,
            Utc.with_ymd_and_hms(2026, 8, 20, 11, 0, 0).unwrap(),
        );
        assert_eq!(feed.total_items, 1);
        assert_eq!(feed.items[0].item.id, "1");

        // The derived view now lives under its own key, on the aggregate's
        // clock: it must never look fresher than the data it was cut from.
        let (entry, _) = cache.get(&CacheKey::AllTier(Tier::Official)).expect("cached");
        assert_eq!(entry.items.len(), 1);
        let (all, _) = cache.get(&CacheKey::Region(Region::All)).expect("aggregate");
        assert_eq!(entry.fetched_at, all.fetched_at);
    }

    #[test]
    fn tier_view_tracks_a_newer_aggregate() {
        let cache = NewsCache::new(CachePolicy::default());
        let mut first = item("1", 10, Region::EuropeRussia, "first readout");
        first.source.tier = Tier::Official;
        commit_batches(&cache, vec![first.clone()], true);

        let query = FeedQuery {
            region: None,
            tier: Some(Tier::Official),
        };
        let now = Utc.with_ymd_and_hms(2026, 8, 20, 11, 0, 0).unwrap();
        let feed = build_feed(&cache, &classifier(), &registry(), &query, now);
        assert_eq!(feed.total_items, 1);

        // A new cycle lands; the view cached by the read above must not
        // keep serving the old aggregate.
        let mut second = item("2", 20, Region::EuropeRussia, "second readout");
        second.source.tier = Tier::Official;
        commit_batches(&cache, vec![first, second], true);

        let feed = build_feed(&cache, &classifier(), &registry(), &query, now);
        assert_eq!(feed.total_items, 2);
        let ids: Vec<&str> = feed.items.iter().map(|a| a.item.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[test]
    fn build_feed_miss_degrades_to_remaining_keys() {
        let cache = NewsCache::new(CachePolicy::default());
        // Only a region entry exists; the aggregate was never written.
        refresh_region(
            &cache,
            Region::EuropeRussia,
            vec![item("1", 10, Region::EuropeRussia, "post one")],
        );

        let feed = build_feed(
            &cache,
            &classifier(),
            &registry(),
            &FeedQuery::default(),
            Utc.with_ymd_and_hms(2026, 8, 20, 11, 0, 0).unwrap(),
        );
        assert_eq!(feed.total_items, 1);
        assert!(!feed.is_complete);
        assert!(feed.stale);
    }

    #[test]
    fn query_key_shapes() {
        assert_eq!(
            FeedQuery { region: Some(Region::EuropeRussia), tier: None }.cache_key(),
            CacheKey::Region(Region::EuropeRussia)
        );
        assert_eq!(
            FeedQuery { region: None, tier: Some(Tier::Osint) }.cache_key(),
            CacheKey::AllTier(Tier::Osint)
        );
        assert_eq!(
            FeedQuery { region: Some(Region::All), tier: None }.cache_key(),
            CacheKey::Region(Region::All)
        );
        // region+tier stays within the allowed key space.
        assert_eq!(
            FeedQuery { region: Some(Region::MiddleEast), tier: Some(Tier::Official) }.cache_key(),
            CacheKey::Region(Region::MiddleEast)
        );
    }
}
