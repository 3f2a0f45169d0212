//! # Source Registry
//!
//! The single versioned table of monitored channels and feeds: trust tier,
//! hand-assigned confidence, and expected posting rate per source.
//!
//! - Loads from TOML (env path override, baked-in default otherwise).
//! - Case-insensitive handle lookup, `@` prefix tolerated.
//! - Per-source daily rates carry provenance: `measured` rates are trusted
//!   as-is, `estimated` (round-number guesses) are clamped to a conservative
//!   cap before they enter any baseline sum.
//! - Region baselines are derived here and nowhere else; optional static
//!   per-region overrides live in the same table.
//! - Includes a built-in `default_seed()` used as fallback on config errors.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::activity::{ActivityThresholds, BaselineTable};
use crate::model::{Region, Source, Tier};

pub const DEFAULT_SOURCES_CONFIG_PATH: &str = "config/sources.toml";
pub const ENV_SOURCES_CONFIG_PATH: &str = "PULSEWATCH_SOURCES_PATH";

/// Baked-in registry; used when no config path override is present.
const DEFAULT_SOURCES_TOML: &str = include_str!("../config/sources.toml");

const DEFAULT_CONFIDENCE: u8 = 60;
const DEFAULT_ESTIMATED_DAILY_CAP: f32 = 12.0;
const DEFAULT_WINDOW_HOURS: u32 = 6;

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
struct RegistryRoot {
    registry: RegistrySection,
    #[serde(default)]
    activity: ActivitySection,
    #[serde(default)]
    sources: Vec<SourceCfg>,
    /// Static per-region daily rates; when present for a region they replace
    /// the per-source sum.
    #[serde(default)]
    baseline_overrides: HashMap<String, f32>,
}

#[derive(Debug, Clone, Deserialize)]
struct RegistrySection {
    version: u32,
    #[serde(default = "default_confidence")]
    default_confidence: u8,
    #[serde(default = "default_estimated_cap")]
    estimated_daily_cap: f32,
}

fn default_confidence() -> u8 {
    DEFAULT_CONFIDENCE
}

fn default_estimated_cap() -> f32 {
    DEFAULT_ESTIMATED_DAILY_CAP
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ActivitySection {
    window_hours: u32,
    critical_multiplier: f32,
    critical_min_count: usize,
    elevated_multiplier: f32,
    elevated_min_count: usize,
}

impl Default for ActivitySection {
    fn default() -> Self {
        let t = ActivityThresholds::default();
        Self {
            window_hours: DEFAULT_WINDOW_HOURS,
            critical_multiplier: t.critical_multiplier,
            critical_min_count: t.critical_min_count,
            elevated_multiplier: t.elevated_multiplier,
            elevated_min_count: t.elevated_min_count,
        }
    }
}

impl ActivitySection {
    fn thresholds(&self) -> ActivityThresholds {
        ActivityThresholds {
            critical_multiplier: self.critical_multiplier,
            critical_min_count: self.critical_min_count,
            elevated_multiplier: self.elevated_multiplier,
            elevated_min_count: self.elevated_min_count,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SourceCfg {
    handle: String,
    #[serde(default = "default_platform")]
    platform: String,
    region: String,
    tier: String,
    #[serde(default = "default_confidence")]
    confidence: u8,
    #[serde(default)]
    posts_per_day: f32,
    #[serde(default)]
    rate_provenance: Option<RateProvenance>,
    /// Feed URL for pull-based platforms (rss); telegram sources are read
    /// from fetcher output files instead.
    #[serde(default)]
    url: Option<String>,
}

fn default_platform() -> String {
    "telegram".to_string()
}

/// Whether a posting rate was observed or guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateProvenance {
    Measured,
    Estimated,
}

/* ----------------------------
Registry
---------------------------- */

/// One registered channel/feed.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub handle: String,
    pub platform: String,
    pub region: Region,
    pub tier: Tier,
    pub confidence: u8,
    pub posts_per_day: f32,
    pub rate_provenance: RateProvenance,
    pub url: Option<String>,
}

impl SourceSpec {
    /// Rate that enters baseline sums: estimated rates are clamped to the
    /// cap, measured rates pass through (never negative).
    fn effective_daily_rate(&self, cap: f32) -> f32 {
        let rate = self.posts_per_day.max(0.0);
        match self.rate_provenance {
            RateProvenance::Measured => rate,
            RateProvenance::Estimated => rate.min(cap),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceRegistry {
    version: u32,
    default_confidence: u8,
    estimated_daily_cap: f32,
    window_hours: u32,
    thresholds: ActivityThresholds,
    sources: Vec<SourceSpec>,
    baseline_overrides: HashMap<Region, f32>,
}

impl SourceRegistry {
    /// Load the registry. Uses PULSEWATCH_SOURCES_PATH when set, otherwise
    /// the baked-in table. Falls back to `default_seed()` on any error so
    /// the process always has a usable registry.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(ENV_SOURCES_CONFIG_PATH).map(PathBuf::from) {
            match fs::read_to_string(&path) {
                Ok(s) => match Self::from_toml_str(&s) {
                    Ok(reg) => return reg,
                    Err(e) => {
                        warn!(target: "sources", path = %path.display(), error = %e, "invalid sources config, using built-in seed");
                        return Self::default_seed();
                    }
                },
                Err(e) => {
                    warn!(target: "sources", path = %path.display(), error = %e, "unreadable sources config, using built-in seed");
                    return Self::default_seed();
                }
            }
        }
        Self::from_toml_str(DEFAULT_SOURCES_TOML).unwrap_or_else(|e| {
            warn!(target: "sources", error = %e, "baked-in sources config invalid, using built-in seed");
            Self::default_seed()
        })
    }

    /// Parse a registry from a TOML string. Individual entries with an
    /// unknown region or tier are skipped with a warning; one bad channel
    /// must not take the whole table down.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let root: RegistryRoot = toml::from_str(toml_str)?;

        let mut sources = Vec::with_capacity(root.sources.len());
        for cfg in root.sources {
            let Some(region) = Region::parse(&cfg.region) else {
                warn!(target: "sources", handle = %cfg.handle, region = %cfg.region, "unknown region, skipping source");
                continue;
            };
            let Some(tier) = parse_tier(&cfg.tier) else {
                warn!(target: "sources", handle = %cfg.handle, tier = %cfg.tier, "unknown tier, skipping source");
                continue;
            };
            // Round-number rates without explicit provenance are treated as
            // estimates; observed rates come with decimals.
            let rate_provenance = cfg.rate_provenance.unwrap_or_else(|| {
                if cfg.posts_per_day.fract() == 0.0 {
                    RateProvenance::Estimated
                } else {
                    RateProvenance::Measured
                }
            });
            sources.push(SourceSpec {
                handle: cfg.handle,
                platform: cfg.platform,
                region,
                tier,
                confidence: cfg.confidence,
                posts_per_day: cfg.posts_per_day,
                rate_provenance,
                url: cfg.url,
            });
        }

        let mut baseline_overrides = HashMap::new();
        for (region, rate) in root.baseline_overrides {
            let Some(region) = Region::parse(&region) else {
                warn!(target: "sources", %region, "unknown region in baseline overrides, skipping");
                continue;
            };
            baseline_overrides.insert(region, rate.max(0.0));
        }

        Ok(Self {
            version: root.registry.version,
            default_confidence: root.registry.default_confidence,
            estimated_daily_cap: root.registry.estimated_daily_cap.max(0.0),
            window_hours: root.activity.window_hours,
            thresholds: root.activity.thresholds(),
            sources,
            baseline_overrides,
        })
    }

    /// Built-in seed mirroring the fetcher's channel set. Used as fallback
    /// if no config can be loaded.
    pub(crate) fn default_seed() -> Self {
        let mk = |handle: &str,
                  region: Region,
                  tier: Tier,
                  confidence: u8,
                  posts_per_day: f32,
                  rate_provenance: RateProvenance| SourceSpec {
            handle: handle.to_string(),
            platform: "telegram".to_string(),
            region,
            tier,
            confidence,
            posts_per_day,
            rate_provenance,
            url: None,
        };

        use RateProvenance::{Estimated, Measured};
        use Region::{EuropeRussia, MiddleEast};

        let sources = vec![
            mk("DeepStateUA", EuropeRussia, Tier::Official, 92, 26.4, Measured),
            mk("DeepStateEN", EuropeRussia, Tier::Official, 92, 18.2, Measured),
            mk("wartranslated", EuropeRussia, Tier::Osint, 90, 14.5, Measured),
            mk("DIUkraine", EuropeRussia, Tier::Official, 95, 6.8, Measured),
            mk("idfofficial", MiddleEast, Tier::Official, 95, 9.6, Measured),
            mk("englishabuali", MiddleEast, Tier::Osint, 82, 20.0, Estimated),
            mk("IranIntl_En", MiddleEast, Tier::Reporter, 85, 35.0, Estimated),
        ];

        Self {
            version: 1,
            default_confidence: DEFAULT_CONFIDENCE,
            estimated_daily_cap: DEFAULT_ESTIMATED_DAILY_CAP,
            window_hours: DEFAULT_WINDOW_HOURS,
            thresholds: ActivityThresholds::default(),
            sources,
            baseline_overrides: HashMap::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn window_hours(&self) -> u32 {
        self.window_hours
    }

    pub fn default_confidence(&self) -> u8 {
        self.default_confidence
    }

    pub fn thresholds(&self) -> ActivityThresholds {
        self.thresholds
    }

    pub fn specs(&self) -> &[SourceSpec] {
        &self.sources
    }

    /// Case-insensitive handle lookup; a leading `@` is ignored.
    pub fn lookup(&self, handle: &str) -> Option<&SourceSpec> {
        let needle = normalize_handle(handle);
        self.sources
            .iter()
            .find(|s| normalize_handle(&s.handle) == needle)
    }

    /// Build the `Source` for a post from `handle`. Handles missing from the
    /// registry get the least-trusted tier and the default confidence.
    pub fn source_for(&self, handle: &str, platform: &str) -> Source {
        match self.lookup(handle) {
            Some(spec) => Source {
                name: spec.handle.clone(),
                platform: spec.platform.clone(),
                tier: spec.tier,
                confidence: spec.confidence,
            },
            None => Source {
                name: handle.trim_start_matches('@').to_string(),
                platform: platform.to_string(),
                tier: Tier::Ground,
                confidence: self.default_confidence,
            },
        }
    }

    /// Expected post count for `region` over a window of `window_hours`.
    /// A static override replaces the per-source sum when configured.
    pub fn region_baseline(&self, region: Region, window_hours: u32) -> f32 {
        let daily = match self.baseline_overrides.get(&region) {
            Some(&rate) => rate,
            None => self
                .sources
                .iter()
                .filter(|s| s.region == region)
                .map(|s| s.effective_daily_rate(self.estimated_daily_cap))
                .sum(),
        };
        daily * window_hours as f32 / 24.0
    }

    /// Baselines for every watchlist region, scaled to `window_hours`.
    pub fn baselines(&self, window_hours: u32) -> BaselineTable {
        Region::watchlist()
            .iter()
            .map(|&r| (r, self.region_baseline(r, window_hours)))
            .collect()
    }

    /// Registry feeds for pull-based ingestion (entries carrying a URL).
    pub fn feed_specs(&self) -> Vec<&SourceSpec> {
        self.sources.iter().filter(|s| s.url.is_some()).collect()
    }
}

/// Tier names as they appear in feed data. `news-org` is the legacy name
/// the fetcher emits for newsroom accounts.
pub fn parse_tier(s: &str) -> Option<Tier> {
    match s.trim().to_ascii_lowercase().as_str() {
        "news-org" => Some(Tier::Reporter),
        other => Tier::parse(other),
    }
}

fn normalize_handle(s: &str) -> String {
    s.trim().trim_start_matches('@').to_ascii_lowercase()
}
