//! Core data model: watch regions, source tiers, normalized posts, and the
//! ephemeral classification/activity results computed per refresh cycle.
//!
//! Wire format is camelCase JSON (the dashboard and the fetch scripts both
//! speak it); everything here is plain data with no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored geographic bucket, plus the catch-all `all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    EuropeRussia,
    MiddleEast,
    AsiaPacific,
    All,
}

impl Region {
    /// The regions we track activity for (excludes the `all` aggregate).
    pub fn watchlist() -> [Region; 3] {
        [Region::EuropeRussia, Region::MiddleEast, Region::AsiaPacific]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Region::EuropeRussia => "europe-russia",
            Region::MiddleEast => "middle-east",
            Region::AsiaPacific => "asia-pacific",
            Region::All => "all",
        }
    }

    /// Parse a region id from feed data. Unknown ids yield `None` so callers
    /// can skip the item instead of failing a whole batch.
    pub fn parse(s: &str) -> Option<Region> {
        match s.trim().to_ascii_lowercase().as_str() {
            "europe-russia" => Some(Region::EuropeRussia),
            "middle-east" => Some(Region::MiddleEast),
            "asia-pacific" => Some(Region::AsiaPacific),
            "all" => Some(Region::All),
            _ => None,
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared trust level of a source. Ordering matters: `official` outranks
/// everything else in dedup tie-breaks and briefing selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Official,
    Osint,
    Reporter,
    Ground,
}

impl Tier {
    /// Comparison key; higher is more trusted.
    pub fn rank(self) -> u8 {
        match self {
            Tier::Official => 3,
            Tier::Osint => 2,
            Tier::Reporter => 1,
            Tier::Ground => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Official => "official",
            Tier::Osint => "osint",
            Tier::Reporter => "reporter",
            Tier::Ground => "ground",
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s.trim().to_ascii_lowercase().as_str() {
            "official" => Some(Tier::Official),
            "osint" => Some(Tier::Osint),
            "reporter" => Some(Tier::Reporter),
            "ground" => Some(Tier::Ground),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a post came from: channel/feed name, platform, declared trust.
/// `confidence` is the hand-assigned 0–100 score from the channel registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub platform: String,
    pub tier: Tier,
    pub confidence: u8,
}

/// Verification level, both as the classifier's axis label and as the
/// derived status stored on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Confirmed,
    Denied,
    Developing,
    #[default]
    Unverified,
}

impl VerificationStatus {
    /// Tie-break priority: explicit confirmation/denial language outranks
    /// mere absence of hedging.
    pub fn priority(self) -> u8 {
        match self {
            VerificationStatus::Confirmed => 3,
            VerificationStatus::Denied => 2,
            VerificationStatus::Developing => 1,
            VerificationStatus::Unverified => 0,
        }
    }

    pub fn parse(s: &str) -> Option<VerificationStatus> {
        match s.trim().to_ascii_lowercase().as_str() {
            "confirmed" => Some(VerificationStatus::Confirmed),
            "denied" => Some(VerificationStatus::Denied),
            "developing" => Some(VerificationStatus::Developing),
            "unverified" => Some(VerificationStatus::Unverified),
            _ => None,
        }
    }
}

/// Rhetorical shape of a post's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Breaking,
    Statement,
    Report,
    Analysis,
    Rumor,
    #[default]
    General,
}

impl ContentType {
    /// Tie-break priority: more specific categories win equal scores.
    pub fn priority(self) -> u8 {
        match self {
            ContentType::Breaking => 5,
            ContentType::Statement => 4,
            ContentType::Report => 3,
            ContentType::Analysis => 2,
            ContentType::Rumor => 1,
            ContentType::General => 0,
        }
    }

    pub fn parse(s: &str) -> Option<ContentType> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breaking" => Some(ContentType::Breaking),
            "statement" => Some(ContentType::Statement),
            "report" => Some(ContentType::Report),
            "analysis" => Some(ContentType::Analysis),
            "rumor" => Some(ContentType::Rumor),
            "general" => Some(ContentType::General),
            _ => None,
        }
    }
}

/// Where the information in a post is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Official,
    Media,
    Aggregating,
    #[default]
    Original,
}

impl Provenance {
    /// Tie-break priority: explicit attribution beats the default
    /// original-reporting assumption.
    pub fn priority(self) -> u8 {
        match self {
            Provenance::Official => 3,
            Provenance::Media => 2,
            Provenance::Aggregating => 1,
            Provenance::Original => 0,
        }
    }

    pub fn parse(s: &str) -> Option<Provenance> {
        match s.trim().to_ascii_lowercase().as_str() {
            "official" => Some(Provenance::Official),
            "media" => Some(Provenance::Media),
            "aggregating" => Some(Provenance::Aggregating),
            "original" => Some(Provenance::Original),
            _ => None,
        }
    }
}

/// Severity/type annotations attached by a separate keyword detector.
/// Carried through untouched; never computed in this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSignal {
    pub severity: u8,
    #[serde(default)]
    pub kinds: Vec<String>,
}

/// A normalized post. `id` is globally unique within a fetch cycle
/// (e.g. `telegram-DeepStateUA-4471`); two items sharing an id are the
/// same underlying post and collapse to one during merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub source: Source,
    pub timestamp: DateTime<Utc>,
    pub region: Region,
    pub url: String,
    #[serde(default)]
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub is_breaking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_signal: Option<EventSignal>,
}

impl NewsItem {
    /// Text the classifier sees: the content when present, else the title.
    pub fn body(&self) -> &str {
        self.content.as_deref().unwrap_or(&self.title)
    }

    /// Age in whole minutes relative to `now` (0 for future timestamps).
    pub fn minutes_ago(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_minutes().max(0)
    }
}

/// One scored classification axis: winning label, aggregate confidence,
/// and the rule ids that matched (evidence for the UI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisResult<T> {
    #[serde(rename = "type")]
    pub label: T,
    pub confidence: f32,
    #[serde(default)]
    pub matched: Vec<String>,
}

/// Provenance axis result; additionally carries the attribution handles and
/// names extracted from the text, capped to keep display cost bounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceResult {
    #[serde(rename = "type")]
    pub label: Provenance,
    pub confidence: f32,
    #[serde(default)]
    pub matched: Vec<String>,
    #[serde(default)]
    pub cited_sources: Vec<String>,
}

/// Full per-item classification. Ephemeral: computed per request, attached
/// to API responses as display metadata, never persisted on the item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub content_type: AxisResult<ContentType>,
    pub verification: AxisResult<VerificationStatus>,
    pub provenance: ProvenanceResult,
}

/// Posting-volume assessment for one watch region over the evaluation
/// window, relative to its configured baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionActivity {
    pub level: ActivityLevel,
    pub count: usize,
    pub baseline: f32,
    pub multiplier: f32,
    pub percent_change: f32,
    pub vs_normal: VsNormal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Critical,
    Elevated,
    #[default]
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VsNormal {
    Above,
    Below,
    #[default]
    Normal,
}

/// Clamp to [0.0, 1.0].
pub(crate) fn clamp01(x: f32) -> f32 {
    if x < 0.0 {
        0.0
    } else if x > 1.0 {
        1.0
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_roundtrip_and_unknowns() {
        for r in Region::watchlist() {
            assert_eq!(Region::parse(r.as_str()), Some(r));
        }
        assert_eq!(Region::parse("ALL"), Some(Region::All));
        assert_eq!(Region::parse("atlantis"), None);
    }

    #[test]
    fn tier_rank_ordering() {
        assert!(Tier::Official.rank() > Tier::Osint.rank());
        assert!(Tier::Osint.rank() > Tier::Reporter.rank());
        assert!(Tier::Reporter.rank() > Tier::Ground.rank());
    }

    #[test]
    fn news_item_wire_shape_is_camel_case() {
        let item = NewsItem {
            id: "telegram-DeepStateUA-1".into(),
            title: "Strike reported near the border".into(),
            content: None,
            source: Source {
                name: "DeepStateUA".into(),
                platform: "telegram".into(),
                tier: Tier::Official,
                confidence: 92,
            },
            timestamp: Utc::now(),
            region: Region::EuropeRussia,
            url: "https://t.me/DeepStateUA/1".into(),
            verification_status: VerificationStatus::default(),
            is_breaking: false,
            event_signal: None,
        };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["region"], serde_json::json!("europe-russia"));
        assert_eq!(v["verificationStatus"], serde_json::json!("unverified"));
        assert_eq!(v["isBreaking"], serde_json::json!(false));
        assert_eq!(v["source"]["tier"], serde_json::json!("official"));
        // Optional fields stay off the wire when absent.
        assert!(v.get("content").is_none());
        assert!(v.get("eventSignal").is_none());
    }

    #[test]
    fn body_falls_back_to_title() {
        let mut item: NewsItem = serde_json::from_value(serde_json::json!({
            "id": "x-1",
            "title": "Title only",
            "source": {"name": "s", "platform": "rss", "tier": "osint", "confidence": 70},
            "timestamp": "2026-08-20T10:00:00Z",
            "region": "middle-east",
            "url": "https://example.org/1"
        }))
        .unwrap();
        assert_eq!(item.body(), "Title only");
        item.content = Some("Full text".into());
        assert_eq!(item.body(), "Full text");
    }
}
