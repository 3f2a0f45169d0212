// tests/aggregate_e2e.rs
//
// End-to-end aggregation: a full fetch cycle followed by a region-scoped
// refresh must merge by id (newer wins), order by recency, and carry
// classification + activity in the assembled feed.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use pulsewatch::aggregate::{build_feed, commit_batches, refresh_region, FeedQuery};
use pulsewatch::cache::{CacheKey, CachePolicy, NewsCache};
use pulsewatch::classify::{ClassifierEngine, ClassifierHandle};
use pulsewatch::model::{NewsItem, Region, Source, Tier, VerificationStatus};
use pulsewatch::sources::SourceRegistry;

fn classifier() -> ClassifierHandle {
    ClassifierHandle::new(ClassifierEngine::from_toml().expect("load classifier config"))
}

fn item(id: &str, minute: u32, title: &str) -> NewsItem {
    NewsItem {
        id: id.to_string(),
        title: title.to_string(),
        content: None,
        source: Source {
            name: "DeepStateUA".to_string(),
            platform: "telegram".to_string(),
            tier: Tier::Official,
            confidence: 92,
        },
        timestamp: Utc.with_ymd_and_hms(2026, 8, 20, 10, minute, 0).unwrap(),
        region: Region::EuropeRussia,
        url: format!("https://t.me/DeepStateUA/{id}"),
        verification_status: VerificationStatus::Unverified,
        is_breaking: false,
        event_signal: None,
    }
}

#[test]
fn region_refresh_merges_into_aggregate_feed() {
    let cache = Arc::new(NewsCache::new(CachePolicy::default()));
    let registry = SourceRegistry::load();

    // Full cycle: A(t=10, id=1), B(t=12, id=2).
    commit_batches(
        &cache,
        vec![item("1", 10, "post A"), item("2", 12, "post B")],
        true,
    );
    // Region refresh: C(t=15, id=1) supersedes A; D(t=16, id=3) is new.
    refresh_region(
        &cache,
        Region::EuropeRussia,
        vec![item("1", 15, "post C"), item("3", 16, "post D")],
    );

    let now = Utc.with_ymd_and_hms(2026, 8, 20, 11, 0, 0).unwrap();
    let feed = build_feed(
        &cache,
        &classifier(),
        &registry,
        &FeedQuery::default(),
        now,
    );

    let ids: Vec<&str> = feed.items.iter().map(|a| a.item.id.as_str()).collect();
    assert_eq!(ids, vec!["3", "1", "2"], "expected [D, C, B]");
    assert_eq!(feed.items[1].item.title, "post C", "id=1 must be the newer copy");
    assert_eq!(
        feed.items[1].item.timestamp,
        Utc.with_ymd_and_hms(2026, 8, 20, 10, 15, 0).unwrap()
    );
    assert_eq!(feed.total_items, 3);
    assert!(feed.is_complete);

    // The activity pass sees the merged window: 3 europe-russia items.
    let activity = feed
        .activity
        .get(&Region::EuropeRussia)
        .expect("watch region present");
    assert_eq!(activity.count, 3);
}

#[test]
fn derived_fields_respect_confidence_floor() {
    let cache = Arc::new(NewsCache::new(CachePolicy::default()));
    let registry = SourceRegistry::load();

    commit_batches(
        &cache,
        vec![
            item("1", 10, "BREAKING: strikes confirmed at the junction"),
            item("2", 12, "morning tea and quiet skies"),
        ],
        true,
    );

    let now = Utc.with_ymd_and_hms(2026, 8, 20, 11, 0, 0).unwrap();
    let feed = build_feed(
        &cache,
        &classifier(),
        &registry,
        &FeedQuery::default(),
        now,
    );

    let strong = feed.items.iter().find(|a| a.item.id == "1").expect("id 1");
    assert!(strong.item.is_breaking);
    assert_eq!(strong.item.verification_status, VerificationStatus::Confirmed);

    // No rule matched: axis confidence 0, item keeps its defaults.
    let plain = feed.items.iter().find(|a| a.item.id == "2").expect("id 2");
    assert!(!plain.item.is_breaking);
    assert_eq!(plain.item.verification_status, VerificationStatus::Unverified);
    assert_eq!(plain.classification.content_type.confidence, 0.0);
}

#[test]
fn repeated_region_refresh_is_idempotent_in_aggregate() {
    let cache = Arc::new(NewsCache::new(CachePolicy::default()));

    commit_batches(&cache, vec![item("1", 10, "post A")], true);
    let batch = vec![item("2", 12, "post B")];
    refresh_region(&cache, Region::EuropeRussia, batch.clone());
    refresh_region(&cache, Region::EuropeRussia, batch);

    let (all, _) = cache
        .get(&CacheKey::Region(Region::All))
        .expect("aggregate entry");
    assert_eq!(all.items.len(), 2, "same batch merged twice counts once");
}
