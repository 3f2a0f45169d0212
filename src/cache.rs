// src/cache.rs
//! Process-local keyed store of fetched item batches with two freshness
//! windows: entries younger than the fresh window are served as-is, entries
//! between the windows are served stale (callers may refresh in the
//! background), entries past the hard ceiling are evicted lazily on read.
//!
//! Entries are replaced wholesale under an RwLock; a reader racing a writer
//! sees the old batch or the new one, never a torn entry. Constructor-
//! injected, lives in the app state, never a process-global.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::{NewsItem, Region, Tier};

pub const DEFAULT_FRESH_SECS: u64 = 120;
pub const DEFAULT_STALE_CEILING_SECS: u64 = 1800;

pub const ENV_CACHE_FRESH_SECS: &str = "PULSEWATCH_CACHE_FRESH_SECS";
pub const ENV_CACHE_STALE_CEILING_SECS: &str = "PULSEWATCH_CACHE_STALE_CEILING_SECS";

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cache_hits_total", "Cache reads served from a live entry.");
        describe_counter!("cache_misses_total", "Cache reads with no usable entry.");
        describe_counter!(
            "cache_stale_served_total",
            "Hits served past the fresh window."
        );
        describe_counter!(
            "cache_evictions_total",
            "Entries dropped at the stale ceiling."
        );
    });
}

/// Logical cache keys: a region id, or "all" restricted to one tier.
/// No other shapes, so merge-on-write stays well-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Region(Region),
    AllTier(Tier),
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Region(r) => f.write_str(r.as_str()),
            CacheKey::AllTier(t) => write!(f, "all:{}", t),
        }
    }
}

/// Freshness windows in seconds; fresh ≤ ceiling always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub fresh_secs: u64,
    pub stale_ceiling_secs: u64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            fresh_secs: DEFAULT_FRESH_SECS,
            stale_ceiling_secs: DEFAULT_STALE_CEILING_SECS,
        }
    }
}

impl CachePolicy {
    /// Read both windows from the environment, falling back to defaults.
    /// A ceiling below the fresh window is raised to it.
    pub fn from_env() -> Self {
        let fresh = parse_secs_env(ENV_CACHE_FRESH_SECS).unwrap_or(DEFAULT_FRESH_SECS);
        let ceiling = parse_secs_env(ENV_CACHE_STALE_CEILING_SECS)
            .unwrap_or(DEFAULT_STALE_CEILING_SECS)
            .max(fresh);
        Self {
            fresh_secs: fresh,
            stale_ceiling_secs: ceiling,
        }
    }
}

fn parse_secs_env(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// A stored batch. `is_complete` is false for partial fetches so the
/// boundary layer can flag degraded data instead of presenting it as whole.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub items: Vec<NewsItem>,
    pub fetched_at: DateTime<Utc>,
    pub is_complete: bool,
}

/// Where a served entry sits between the two windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
}

/// Row for the debug endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDebugEntry {
    pub key: String,
    pub items: usize,
    pub age_secs: u64,
    pub state: &'static str,
    pub is_complete: bool,
}

pub struct NewsCache {
    policy: CachePolicy,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl NewsCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Read one key. A miss (absent, lazily evicted, or poisoned lock) is
    /// normal control flow meaning "no cached data", never an error.
    pub fn get(&self, key: &CacheKey) -> Option<(CacheEntry, Freshness)> {
        ensure_metrics_described();

        let snapshot = match self.entries.read() {
            Ok(map) => map.get(key).cloned(),
            Err(_) => None,
        };
        let Some(entry) = snapshot else {
            counter!("cache_misses_total").increment(1);
            return None;
        };

        let age = entry_age_secs(&entry, Utc::now());
        if age >= self.policy.stale_ceiling_secs {
            if let Ok(mut map) = self.entries.write() {
                // Evict only the entry we observed; a concurrent set may have
                // refreshed this key in the meantime.
                if map.get(key).is_some_and(|e| e.fetched_at == entry.fetched_at) {
                    map.remove(key);
                }
            }
            counter!("cache_evictions_total").increment(1);
            counter!("cache_misses_total").increment(1);
            return None;
        }

        let freshness = if age < self.policy.fresh_secs {
            Freshness::Fresh
        } else {
            Freshness::Stale
        };
        if freshness == Freshness::Stale {
            counter!("cache_stale_served_total").increment(1);
        }
        counter!("cache_hits_total").increment(1);
        Some((entry, freshness))
    }

    /// Store a complete batch under `key`, returning the key to the fresh
    /// state. Writing a specific region also folds the batch into the `all`
    /// aggregate (if one exists) so the aggregate view never regresses
    /// behind a region-specific write; the aggregate keeps its own
    /// `fetched_at`/`is_complete`. Any region write changes what the
    /// aggregate holds, so tier views cut from the old aggregate are
    /// dropped and rebuilt on their next read.
    pub fn set(&self, key: CacheKey, items: Vec<NewsItem>, is_complete: bool) {
        let mut items = items;
        sort_by_recency(&mut items);
        let entry = CacheEntry {
            items,
            fetched_at: Utc::now(),
            is_complete,
        };

        if let Ok(mut map) = self.entries.write() {
            if let CacheKey::Region(region) = key {
                map.retain(|k, _| !matches!(k, CacheKey::AllTier(_)));
                if region != Region::All {
                    if let Some(all) = map.get_mut(&CacheKey::Region(Region::All)) {
                        merge_newest(&mut all.items, &entry.items);
                        sort_by_recency(&mut all.items);
                    }
                }
            }
            map.insert(key, entry);
        }
    }

    /// Store a view cut from another entry. The view keeps the parent's
    /// clock and completeness, so it ages (and evicts) in lockstep with the
    /// entry it was derived from instead of restarting the windows.
    pub fn set_derived(&self, key: CacheKey, items: Vec<NewsItem>, parent: &CacheEntry) {
        let mut items = items;
        sort_by_recency(&mut items);
        let entry = CacheEntry {
            items,
            fetched_at: parent.fetched_at,
            is_complete: parent.is_complete,
        };
        if let Ok(mut map) = self.entries.write() {
            map.insert(key, entry);
        }
    }

    /// Union of all live entries, deduplicated by id (latest timestamp
    /// wins), sorted descending by timestamp. Entries past the ceiling are
    /// skipped but not removed; eviction stays a per-key read concern.
    pub fn get_all(&self) -> Vec<NewsItem> {
        let now = Utc::now();
        let mut entries: Vec<CacheEntry> = match self.entries.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => return Vec::new(),
        };
        entries.retain(|e| entry_age_secs(e, now) < self.policy.stale_ceiling_secs);
        // Freshest batch first, so it is the one kept on timestamp ties.
        entries.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));

        let mut merged: Vec<NewsItem> = Vec::new();
        for entry in &entries {
            merge_newest(&mut merged, &entry.items);
        }
        sort_by_recency(&mut merged);
        merged
    }

    /// Drop one key, or everything when `key` is `None`.
    pub fn invalidate(&self, key: Option<&CacheKey>) {
        if let Ok(mut map) = self.entries.write() {
            match key {
                Some(k) => {
                    map.remove(k);
                }
                None => map.clear(),
            }
        }
    }

    /// Clear all entries. Tests and admin tooling.
    pub fn reset(&self) {
        self.invalidate(None);
    }

    /// Stable, serializable view of every entry for the debug endpoint.
    pub fn debug_snapshot(&self) -> Vec<CacheDebugEntry> {
        let now = Utc::now();
        let mut rows: Vec<CacheDebugEntry> = match self.entries.read() {
            Ok(map) => map
                .iter()
                .map(|(key, e)| {
                    let age = entry_age_secs(e, now);
                    let state = if age >= self.policy.stale_ceiling_secs {
                        "expired"
                    } else if age < self.policy.fresh_secs {
                        "fresh"
                    } else {
                        "stale"
                    };
                    CacheDebugEntry {
                        key: key.to_string(),
                        items: e.items.len(),
                        age_secs: age,
                        state,
                        is_complete: e.is_complete,
                    }
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        rows
    }
}

fn entry_age_secs(entry: &CacheEntry, now: DateTime<Utc>) -> u64 {
    (now - entry.fetched_at).num_seconds().max(0) as u64
}

/// Fold `incoming` into `base`, keyed by item id. A strictly newer timestamp
/// replaces the held copy; ties keep the first-seen instance.
pub(crate) fn merge_newest(base: &mut Vec<NewsItem>, incoming: &[NewsItem]) {
    for item in incoming {
        match base.iter_mut().find(|held| held.id == item.id) {
            Some(held) => {
                if item.timestamp > held.timestamp {
                    *held = item.clone();
                }
            }
            None => base.push(item.clone()),
        }
    }
}

/// Descending by timestamp; timestamp ties rank higher-trust sources first.
pub(crate) fn sort_by_recency(items: &mut [NewsItem]) {
    items.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.source.tier.rank().cmp(&a.source.tier.rank()))
    });
}
