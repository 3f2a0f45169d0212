// src/briefing.rs
//! Briefing input selection: score, collapse near-duplicate headlines, cap.
//!
//! - Rank = tier weight (official 3 .. ground 0) + recency decay over the
//!   activity window + a flat bonus for breaking items.
//! - Headlines that say the same thing are collapsed to the higher-ranked
//!   copy before the cap is applied.
//!
//! Similarity: keyword-token Jaccard, with `strsim::normalized_levenshtein`
//! (f64 -> cast to f32) as a fallback for reworded but near-identical titles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strsim::normalized_levenshtein;

use crate::aggregate::AnnotatedItem;
use crate::model::{ContentType, Provenance, Tier, VerificationStatus};

/// One line of the structured input handed to the summarization service.
/// The service itself is opaque; responsibility ends at producing this.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefingItem {
    pub source: String,
    pub tier: Tier,
    pub minutes_ago: i64,
    pub title: String,
    pub content_type: ContentType,
    pub verification: VerificationStatus,
    pub provenance: Provenance,
}

struct Candidate<'a> {
    item: &'a AnnotatedItem,
    score: f32,
    keywords: HashSet<String>,
    normalized_title: String,
}

/// Select the bounded, deduplicated subset of the feed worth summarizing.
/// `items` is the annotated feed (any order); output is rank-descending and
/// at most `cap` long.
pub fn select_briefing_input(
    items: &[AnnotatedItem],
    now: DateTime<Utc>,
    cap: usize,
) -> Vec<BriefingItem> {
    let mut candidates: Vec<Candidate> = items
        .iter()
        .map(|a| {
            let normalized_title = normalize_title(&a.item.title);
            Candidate {
                item: a,
                score: rank_score(a, now),
                keywords: keyword_tokens(&normalized_title),
                normalized_title,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.item.item.timestamp.cmp(&a.item.item.timestamp))
            .then_with(|| b.item.item.source.tier.rank().cmp(&a.item.item.source.tier.rank()))
            .then_with(|| a.item.item.id.cmp(&b.item.item.id))
    });

    let mut kept: Vec<&Candidate> = Vec::new();
    for candidate in &candidates {
        if kept.len() >= cap {
            break;
        }
        let duplicate = kept
            .iter()
            .any(|k| is_near_duplicate(k, candidate));
        if !duplicate {
            kept.push(candidate);
        }
    }

    kept.into_iter()
        .map(|c| BriefingItem {
            source: c.item.item.source.name.clone(),
            tier: c.item.item.source.tier,
            minutes_ago: c.item.item.minutes_ago(now),
            title: c.item.item.title.clone(),
            content_type: c.item.classification.content_type.label,
            verification: c.item.classification.verification.label,
            provenance: c.item.classification.provenance.label,
        })
        .collect()
}

fn rank_score(a: &AnnotatedItem, now: DateTime<Utc>) -> f32 {
    let tier = a.item.source.tier.rank() as f32;
    let age_minutes = a.item.minutes_ago(now) as f32;
    let window_minutes = (BRIEFING_RECENCY_WINDOW_HOURS * 60) as f32;
    let recency = (1.0 - age_minutes / window_minutes).max(0.0);
    let breaking = if a.item.is_breaking { BREAKING_BONUS } else { 0.0 };
    tier + RECENCY_WEIGHT * recency + breaking
}

fn is_near_duplicate(kept: &Candidate, candidate: &Candidate) -> bool {
    if keyword_jaccard(&kept.keywords, &candidate.keywords) >= JACCARD_THRESHOLD {
        return true;
    }
    let sim = normalized_levenshtein(&kept.normalized_title, &candidate.normalized_title) as f32;
    sim >= LEVENSHTEIN_THRESHOLD
}

fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if !out.ends_with(' ') {
            // whitespace and punctuation both act as token boundaries
            out.push(' ');
        }
    }
    out.trim().to_string()
}

fn keyword_tokens(normalized_title: &str) -> HashSet<String> {
    normalized_title
        .split_whitespace()
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

fn keyword_jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f32 / union as f32
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "are", "was", "were",
    "has", "have", "been", "will", "after", "over", "near", "into", "amid",
];

/// Selection defaults
pub const DEFAULT_BRIEFING_CAP: usize = 20;
pub const JACCARD_THRESHOLD: f32 = 0.6;
pub const LEVENSHTEIN_THRESHOLD: f32 = 0.85;
pub const BREAKING_BONUS: f32 = 1.5;
pub const RECENCY_WEIGHT: f32 = 2.0;
pub const BRIEFING_RECENCY_WINDOW_HOURS: u32 = 6;
