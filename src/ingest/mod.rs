// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod types;

use crate::ingest::types::NewsProvider;
use crate::model::NewsItem;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::collections::HashSet;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_posts_total", "Total posts parsed from providers.");
        describe_counter!(
            "ingest_kept_total",
            "Posts kept after normalization + filtering."
        );
        describe_counter!(
            "ingest_filtered_total",
            "Posts dropped for empty text, bad timestamps, or unknown regions."
        );
        describe_counter!(
            "ingest_dedup_total",
            "Posts removed as duplicate ids within one run."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_counter!("ingest_runs_total", "Completed ingest ticks.");
        describe_histogram!("ingest_parse_ms", "Provider parse time in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the ingest pipeline last ran."
        );
    });
}

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

/// Longest text kept per post; beyond this it is noise for both the
/// classifier and the feed.
const POST_TEXT_CAP: usize = 1500;

/// Reduce a raw post body (Telegram text or RSS description HTML) to plain
/// classifier-ready text. Tags become spaces so adjacent RSS paragraphs do
/// not fuse into one word. Emoji survive; the rule tables key on them.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = TAG_RE.replace_all(&decoded, " ");

    let mut out = String::with_capacity(stripped.len());
    for ch in stripped.chars() {
        match ch {
            // zero-width characters ride along in Telegram copy-paste
            '\u{200B}'..='\u{200D}' | '\u{FEFF}' => {}
            '\u{201C}' | '\u{201D}' | '\u{00AB}' | '\u{00BB}' => out.push('"'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            _ => out.push(ch),
        }
    }

    let collapsed = WS_RE.replace_all(&out, " ");
    let trimmed = collapsed
        .trim()
        .trim_end_matches(&['!', '?', '.', ','][..])
        .trim_end();

    if trimmed.chars().count() > POST_TEXT_CAP {
        trimmed.chars().take(POST_TEXT_CAP).collect()
    } else {
        trimmed.to_string()
    }
}

/// Derive the display title from normalized text: first `TITLE_MAX` chars,
/// with the full text kept as content only when it is longer.
pub fn split_title(text: &str) -> (String, Option<String>) {
    const TITLE_MAX: usize = 140;
    if text.chars().count() <= TITLE_MAX {
        return (text.to_string(), None);
    }
    let mut title: String = text.chars().take(TITLE_MAX).collect();
    title = title.trim_end().to_string();
    title.push_str("...");
    (title, Some(text.to_string()))
}

/// Result of one ingest pass across all providers.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub items: Vec<NewsItem>,
    pub filtered: usize,
    pub deduped: usize,
    pub provider_errors: usize,
}

/// Drop unusable items and collapse duplicate ids within one run.
/// First-seen wins, matching the merge policy downstream.
pub fn sanitize(raw: Vec<NewsItem>) -> (Vec<NewsItem>, usize, usize) {
    let mut filtered = 0usize;
    let mut deduped = 0usize;
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());

    for item in raw {
        if item.id.trim().is_empty() || item.title.trim().is_empty() {
            filtered += 1;
            continue;
        }
        if !seen.insert(item.id.clone()) {
            deduped += 1;
            continue;
        }
        out.push(item);
    }

    (out, filtered, deduped)
}

/// Run ingest once across the given providers. Provider failures are
/// isolated: each is logged and counted, and the run continues with
/// whatever the remaining providers return.
pub async fn run_once(providers: &[Box<dyn NewsProvider>]) -> IngestOutcome {
    ensure_metrics_described();

    let mut raw: Vec<NewsItem> = Vec::new();
    let mut provider_errors = 0usize;
    for p in providers {
        match p.fetch_latest().await {
            Ok(mut v) => raw.append(&mut v),
            Err(e) => {
                tracing::warn!(error = ?e, provider = p.name(), "provider error");
                counter!("ingest_provider_errors_total").increment(1);
                provider_errors += 1;
            }
        }
    }

    let (items, filtered, deduped) = sanitize(raw);

    counter!("ingest_kept_total").increment(items.len() as u64);
    counter!("ingest_filtered_total").increment(filtered as u64);
    counter!("ingest_dedup_total").increment(deduped as u64);
    gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

    IngestOutcome {
        items,
        filtered,
        deduped,
        provider_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Region, Source, Tier};
    use chrono::{TimeZone, Utc};

    #[test]
    fn normalize_text_flattens_rss_markup() {
        let s = "  <p>Delegations&nbsp;returned</p><p>to the table</p>!!  ";
        assert_eq!(normalize_text(s), "Delegations returned to the table");
    }

    #[test]
    fn normalize_text_keeps_emoji_and_drops_zero_width() {
        let s = "\u{1F6A8} Sit\u{200B}rep: \u{201C}quiet\u{201D} along the line\u{FEFF}";
        assert_eq!(normalize_text(s), "\u{1F6A8} Sitrep: \"quiet\" along the line");
    }

    #[test]
    fn split_title_short_text_has_no_content() {
        let (title, content) = split_title("Short update");
        assert_eq!(title, "Short update");
        assert!(content.is_none());
    }

    #[test]
    fn split_title_long_text_truncates() {
        let text = "x".repeat(200);
        let (title, content) = split_title(&text);
        assert_eq!(title.chars().count(), 143);
        assert!(title.ends_with("..."));
        assert_eq!(content.as_deref(), Some(text.as_str()));
    }

    fn mk(id: &str, title: &str) -> NewsItem {
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
            timestamp: Utc.with_ymd_and_hms(2026, 8, 20, 10, 0, 0).unwrap(),
            region: Region::EuropeRussia,
            url: String::new(),
            verification_status: Default::default(),
            is_breaking: false,
            event_signal: None,
        }
    }

    #[test]
    fn sanitize_drops_empties_and_duplicate_ids() {
        let raw = vec![
            mk("1", "first"),
            mk("", "no id"),
            mk("2", "  "),
            mk("1", "duplicate of first"),
            mk("3", "third"),
        ];
        let (items, filtered, deduped) = sanitize(raw);
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(filtered, 2);
        assert_eq!(deduped, 1);
        assert_eq!(items[0].title, "first");
    }
}
