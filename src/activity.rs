// src/activity.rs
//! Posting-rate surge detection per watch region. Pure business logic,
//! no I/O, no side effects.
//!
//! One counting pass over items the caller has already time-filtered, then
//! per-region gating against configured baselines. Every level gate has two
//! legs that must hold at once: a multiplier floor alone is statistically
//! meaningless in low-volume regions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{ActivityLevel, NewsItem, Region, RegionActivity, VsNormal};

pub const DEFAULT_CRITICAL_MULTIPLIER: f32 = 3.0;
pub const DEFAULT_CRITICAL_MIN_COUNT: usize = 25;
pub const DEFAULT_ELEVATED_MULTIPLIER: f32 = 1.5;
pub const DEFAULT_ELEVATED_MIN_COUNT: usize = 10;

/// Count must deviate from baseline by more than this share before
/// `vs_normal` reports above/below.
const VS_NORMAL_DEADBAND: f32 = 0.10;

/// Expected per-region counts for the evaluation window.
pub type BaselineTable = HashMap<Region, f32>;

/// Level gates. One table, loaded from the sources config; nothing else in
/// the crate carries threshold literals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityThresholds {
    pub critical_multiplier: f32,
    pub critical_min_count: usize,
    pub elevated_multiplier: f32,
    pub elevated_min_count: usize,
}

impl Default for ActivityThresholds {
    fn default() -> Self {
        Self {
            critical_multiplier: DEFAULT_CRITICAL_MULTIPLIER,
            critical_min_count: DEFAULT_CRITICAL_MIN_COUNT,
            elevated_multiplier: DEFAULT_ELEVATED_MULTIPLIER,
            elevated_min_count: DEFAULT_ELEVATED_MIN_COUNT,
        }
    }
}

/// Count items per watch region and assess each region on the watchlist.
/// Items tagged `all` are skipped; the caller has already applied the
/// look-back window, so no additional time filtering happens here.
pub fn compute_activity(
    items: &[NewsItem],
    baselines: &BaselineTable,
    thresholds: &ActivityThresholds,
) -> HashMap<Region, RegionActivity> {
    let mut counts: HashMap<Region, usize> = HashMap::new();
    for item in items {
        if item.region == Region::All {
            continue;
        }
        *counts.entry(item.region).or_insert(0) += 1;
    }

    Region::watchlist()
        .iter()
        .map(|&region| {
            let count = counts.get(&region).copied().unwrap_or(0);
            let baseline = baselines.get(&region).copied().unwrap_or(0.0).max(0.0);
            (region, assess(count, baseline, thresholds))
        })
        .collect()
}

/// Assess one region's count against its baseline. Total over the input
/// domain: baseline 0 yields multiplier 0 and percent change 0, never a
/// division error.
pub fn assess(count: usize, baseline: f32, thresholds: &ActivityThresholds) -> RegionActivity {
    let (multiplier, percent_change, vs_normal) = if baseline > 0.0 {
        let c = count as f32;
        let vs_normal = if c > baseline * (1.0 + VS_NORMAL_DEADBAND) {
            VsNormal::Above
        } else if c < baseline * (1.0 - VS_NORMAL_DEADBAND) {
            VsNormal::Below
        } else {
            VsNormal::Normal
        };
        (
            round1(c / baseline),
            round1((c - baseline) / baseline * 100.0),
            vs_normal,
        )
    } else {
        (0.0, 0.0, VsNormal::Normal)
    };

    // Gating uses the reported (rounded) multiplier so the level always
    // matches the numbers shown to consumers.
    let level = if multiplier >= thresholds.critical_multiplier
        && count >= thresholds.critical_min_count
    {
        ActivityLevel::Critical
    } else if multiplier >= thresholds.elevated_multiplier
        && count >= thresholds.elevated_min_count
    {
        ActivityLevel::Elevated
    } else {
        ActivityLevel::Normal
    };

    RegionActivity {
        level,
        count,
        baseline: round1(baseline),
        multiplier,
        percent_change,
        vs_normal,
    }
}

/// Round to one decimal place.
pub(crate) fn round1(x: f32) -> f32 {
    (x * 10.0).round() / 10.0
}
