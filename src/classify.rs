// src/classify.rs
//! Message classifier: config types, regex compilation, per-axis scoring,
//! and cited-source extraction.
//!
//! Three independent axes (content type, verification, provenance) are scored
//! from the same tagged-rule table. Classification is deterministic and total:
//! any input, including the empty string, yields a result for every axis.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

use crate::model::{
    clamp01, AxisResult, Classification, ContentType, Provenance, ProvenanceResult,
    VerificationStatus,
};

// --- env defaults & names ---
pub const DEFAULT_CLASSIFIER_CONFIG_PATH: &str = "config/classifier.toml";
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.3;

pub const ENV_CLASSIFIER_CONFIG_PATH: &str = "PULSEWATCH_CLASSIFIER_PATH";
pub const ENV_MIN_CONFIDENCE: &str = "PULSEWATCH_MIN_CONFIDENCE";

/// Baked-in rule table; used when no config path override is present.
const DEFAULT_CLASSIFIER_TOML: &str = include_str!("../config/classifier.toml");

/// Additional matches within one pattern family contribute at this decaying
/// rate, so one repeated cue cannot dominate an axis on its own.
const FAMILY_DAMPENING: f32 = 0.5;

/// Cap on extracted attribution handles/names per post.
const MAX_CITED_SOURCES: usize = 5;

// Dev logging gate: PULSEWATCH_DEV_LOG=1 AND dev env (debug or PULSEWATCH_ENV in {local,development,dev})
pub(crate) fn dev_logging_enabled() -> bool {
    let on = std::env::var("PULSEWATCH_DEV_LOG").ok().as_deref() == Some("1");
    if !on {
        return false;
    }
    if cfg!(debug_assertions) {
        return true;
    }
    matches!(
        std::env::var("PULSEWATCH_ENV")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "local" | "development" | "dev"
    )
}

// Post text never reaches logs; diagnostics carry this hash instead.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub(crate) fn truncate_vec<T: ToString>(v: &[T], max: usize) -> Vec<String> {
    v.iter().take(max).map(|x| x.to_string()).collect()
}

/// Minimal, anonymized dev logger for classification events.
fn dev_log_classification(text: &str, result: &Classification) {
    if !dev_logging_enabled() {
        return;
    }
    let id = anon_hash(text);
    info!(
        target: "classify",
        %id,
        content_type = ?result.content_type.label,
        content_conf = result.content_type.confidence,
        verification = ?result.verification.label,
        verification_conf = result.verification.confidence,
        provenance = ?result.provenance.label,
        provenance_conf = result.provenance.confidence,
        cited = ?truncate_vec(&result.provenance.cited_sources, MAX_CITED_SOURCES),
    );
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_confidence_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .map(|v| v.clamp(0.0, 1.0))
}

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierRoot {
    pub classifier: ClassifierSection,
    #[serde(default)]
    pub content_type: Vec<RuleCfg>,
    #[serde(default)]
    pub verification: Vec<RuleCfg>,
    #[serde(default)]
    pub provenance: Vec<RuleCfg>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierSection {
    /// Axis confidence below this is kept in the result but treated as not
    /// worth surfacing by downstream consumers.
    pub min_confidence: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleCfg {
    pub id: String,
    pub category: String, // axis label, e.g. "breaking" | "confirmed" | "official"
    pub pattern: String,  // regex (already escaped in TOML)
    pub weight: f32,
    /// Dampening group; rules without one form a single-member family.
    #[serde(default)]
    pub family: Option<String>,
}

/* ----------------------------
Compiled engine structures
---------------------------- */

#[derive(Debug)]
struct CompiledRule<T> {
    id: String,
    label: T,
    family: String,
    weight: f32,
    re: Regex,
}

fn compile_axis<T: Copy>(
    axis: &str,
    rules: &[RuleCfg],
    parse: impl Fn(&str) -> Option<T>,
) -> anyhow::Result<Vec<CompiledRule<T>>> {
    rules
        .iter()
        .map(|r| {
            let label = parse(&r.category).ok_or_else(|| {
                anyhow::anyhow!("{} rule `{}`: unknown category `{}`", axis, r.id, r.category)
            })?;
            if !r.weight.is_finite() || r.weight < 0.0 {
                return Err(anyhow::anyhow!(
                    "{} rule `{}`: weight must be a non-negative number",
                    axis,
                    r.id
                ));
            }
            let re = Regex::new(&r.pattern)
                .map_err(|e| anyhow::anyhow!("{} rule `{}` regex error: {}", axis, r.id, e))?;
            Ok(CompiledRule {
                id: r.id.clone(),
                label,
                family: r.family.clone().unwrap_or_else(|| r.id.clone()),
                weight: r.weight,
                re,
            })
        })
        .collect()
}

/// The engine holds compiled regexes for all three axes.
#[derive(Debug)]
pub struct ClassifierEngine {
    min_confidence: f32,
    content_type: Vec<CompiledRule<ContentType>>,
    verification: Vec<CompiledRule<VerificationStatus>>,
    provenance: Vec<CompiledRule<Provenance>>,
}

impl ClassifierEngine {
    /// Load the rule table. Uses PULSEWATCH_CLASSIFIER_PATH when set,
    /// otherwise the baked-in default config.
    pub fn from_toml() -> anyhow::Result<Self> {
        let mut eng = match std::env::var(ENV_CLASSIFIER_CONFIG_PATH).map(PathBuf::from) {
            Ok(path) => {
                let content = fs::read_to_string(&path).map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to read classifier config at {}: {}",
                        path.display(),
                        e
                    )
                })?;
                Self::from_toml_str(&content)?
            }
            Err(_) => Self::from_toml_str(DEFAULT_CLASSIFIER_TOML)?,
        };

        // optional: override the confidence floor from env
        if let Some(t) = parse_confidence_env(std::env::var(ENV_MIN_CONFIDENCE).ok()) {
            eng.min_confidence = t;
        } else if !eng.min_confidence.is_finite() {
            eng.min_confidence = DEFAULT_MIN_CONFIDENCE;
        }

        Ok(eng)
    }

    /// Parse a rule table from TOML and compile every pattern.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let cfg: ClassifierRoot = toml::from_str(toml_str)?;
        Ok(Self {
            min_confidence: cfg.classifier.min_confidence,
            content_type: compile_axis("content_type", &cfg.content_type, ContentType::parse)?,
            verification: compile_axis(
                "verification",
                &cfg.verification,
                VerificationStatus::parse,
            )?,
            provenance: compile_axis("provenance", &cfg.provenance, Provenance::parse)?,
        })
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    /// Classify one post's text across all three axes. Never fails: text
    /// matching no rules yields the default label per axis with confidence 0.
    pub fn classify(&self, text: &str) -> Classification {
        let content_type = score_axis(
            &self.content_type,
            text,
            ContentType::priority,
            ContentType::General,
        );
        let verification = score_axis(
            &self.verification,
            text,
            VerificationStatus::priority,
            VerificationStatus::Unverified,
        );
        let prov = score_axis(
            &self.provenance,
            text,
            Provenance::priority,
            Provenance::Original,
        );
        let result = Classification {
            content_type,
            verification,
            provenance: ProvenanceResult {
                label: prov.label,
                confidence: prov.confidence,
                matched: prov.matched,
                cited_sources: extract_cited_sources(text),
            },
        };
        dev_log_classification(text, &result);
        result
    }
}

/* ----------------------------
Axis scoring
---------------------------- */

/// Score one axis: every non-overlapping match contributes its rule's weight
/// to the rule's category, with same-family contributions decayed (largest
/// first, then halved per extra entry) and the category total capped at 1.0.
/// The winning category is the highest score; exact ties resolve by the axis
/// priority order. No match at all falls back to `default` with confidence 0.
fn score_axis<T: Copy + PartialEq>(
    rules: &[CompiledRule<T>],
    text: &str,
    priority: fn(T) -> u8,
    default: T,
) -> AxisResult<T> {
    // A rule matching m times contributes m entries, so a repeated cue keeps
    // adding (decayed) weight instead of counting once.
    let hits: Vec<(&CompiledRule<T>, usize)> = rules
        .iter()
        .filter_map(|r| {
            let count = r.re.find_iter(text).count();
            (count > 0).then_some((r, count))
        })
        .collect();

    let mut labels: Vec<T> = Vec::new();
    for (rule, _) in &hits {
        if !labels.contains(&rule.label) {
            labels.push(rule.label);
        }
    }

    let mut best: Option<(T, f32)> = None;
    for &label in &labels {
        let score = label_score(&hits, label);
        match best {
            None => best = Some((label, score)),
            Some((b_label, b_score)) => {
                if score > b_score || (score == b_score && priority(label) > priority(b_label)) {
                    best = Some((label, score));
                }
            }
        }
    }

    match best {
        Some((label, score)) if score > 0.0 => {
            let mut matched: Vec<String> = hits
                .iter()
                .filter(|(rule, _)| rule.label == label)
                .map(|(rule, _)| rule.id.clone())
                .collect();
            matched.sort();
            matched.dedup();
            AxisResult {
                label,
                confidence: clamp01(score),
                matched,
            }
        }
        _ => AxisResult {
            label: default,
            confidence: 0.0,
            matched: Vec::new(),
        },
    }
}

fn label_score<T: Copy + PartialEq>(hits: &[(&CompiledRule<T>, usize)], label: T) -> f32 {
    // BTreeMap keeps family iteration order stable so float accumulation
    // is reproducible across calls.
    let mut families: BTreeMap<&str, Vec<f32>> = BTreeMap::new();
    for (rule, count) in hits.iter().filter(|(rule, _)| rule.label == label) {
        let bucket = families.entry(rule.family.as_str()).or_default();
        bucket.extend(std::iter::repeat(rule.weight).take(*count));
    }
    let mut score = 0.0f32;
    for weights in families.values_mut() {
        weights.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        for (k, w) in weights.iter().enumerate() {
            score += w * FAMILY_DAMPENING.powi(k as i32);
        }
    }
    score.min(1.0)
}

/* ----------------------------
Cited-source extraction
---------------------------- */

static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@[A-Za-z0-9_]{2,32}\b").expect("handle regex"));

// Keyword match is case-insensitive; the cited name itself must start with a
// capital or a handle so ordinary prose ("per day") is not captured.
static ATTRIBUTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?i:via|per|according\s+to)\s+(@?[A-Z][\w&'-]*(?:\s+[A-Z][\w&'-]*){0,2})")
        .expect("attribution regex")
});

/// Pull attribution targets out of the text: `@handle` mentions plus the
/// names following "via"/"per"/"according to". First-seen order, deduplicated,
/// capped at MAX_CITED_SOURCES.
pub fn extract_cited_sources(text: &str) -> Vec<String> {
    let mut cited: Vec<String> = Vec::new();

    for caps in ATTRIBUTION_RE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            let name = m.as_str().trim_end_matches(['.', ',', ':', ';']).to_string();
            if !name.is_empty() && !cited.contains(&name) {
                cited.push(name);
            }
        }
    }

    for m in HANDLE_RE.find_iter(text) {
        let handle = m.as_str().to_string();
        if !cited.contains(&handle) {
            cited.push(handle);
        }
    }

    cited.truncate(MAX_CITED_SOURCES);
    cited
}

/* ----------------------------
Thread-safe handle + hot reload
---------------------------- */

/// Shared, cloneable access to the engine. The rule table behind it can be
/// swapped at runtime: set PULSEWATCH_HOT_RELOAD=1 in a dev/local build
/// (cfg!(debug_assertions) or PULSEWATCH_ENV "local"/"development").
#[derive(Clone)]
pub struct ClassifierHandle {
    inner: Arc<RwLock<ClassifierEngine>>,
}

impl ClassifierHandle {
    pub fn new(engine: ClassifierEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    pub fn classify(&self, text: &str) -> Classification {
        if let Ok(eng) = self.inner.read() {
            eng.classify(text)
        } else {
            default_classification(text)
        }
    }

    /// Confidence floor the aggregation layer applies before deriving
    /// item-level fields from axis results.
    pub fn min_confidence(&self) -> f32 {
        self.inner
            .read()
            .map(|eng| eng.min_confidence())
            .unwrap_or(DEFAULT_MIN_CONFIDENCE)
    }

    /// Swap in a new engine; readers pick it up on their next call.
    fn replace(&self, engine: ClassifierEngine) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = engine;
        }
    }
}

/// All-default result used when the engine lock is unavailable.
fn default_classification(text: &str) -> Classification {
    Classification {
        content_type: AxisResult {
            label: ContentType::General,
            confidence: 0.0,
            matched: Vec::new(),
        },
        verification: AxisResult {
            label: VerificationStatus::Unverified,
            confidence: 0.0,
            matched: Vec::new(),
        },
        provenance: ProvenanceResult {
            label: Provenance::Original,
            confidence: 0.0,
            matched: Vec::new(),
            cited_sources: extract_cited_sources(text),
        },
    }
}

/// Hot reload is opt-in and only honored in dev/local builds.
fn hot_reload_enabled() -> bool {
    let want = std::env::var("PULSEWATCH_HOT_RELOAD")
        .ok()
        .map(|v| v == "1")
        .unwrap_or(false);
    if !want {
        return false;
    }
    if cfg!(debug_assertions) {
        return true;
    }
    matches!(
        std::env::var("PULSEWATCH_ENV")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "local" | "development" | "dev"
    )
}

/// Watch the rule file and swap the engine in place when it changes.
/// A plain mtime poll on a std thread is enough; the config is one small
/// file and a 2s lag on rule edits is invisible next to the fetch cadence.
pub fn start_hot_reload_thread(handle: ClassifierHandle, path: PathBuf) {
    if !hot_reload_enabled() {
        return;
    }

    thread::spawn(move || {
        const POLL: Duration = Duration::from_secs(2);
        let mut last_seen: Option<SystemTime> = None;

        loop {
            // The first successful stat only seeds last_seen; a reload
            // needs a strictly newer mtime than the last one recorded.
            if let Ok(mtime) = fs::metadata(&path).and_then(|m| m.modified()) {
                let changed = last_seen.is_some_and(|prev| mtime > prev);
                last_seen = Some(mtime);
                if changed {
                    reload_rules(&handle, &path);
                }
            }
            thread::sleep(POLL);
        }
    });
}

/// Parse and swap, or keep the current rules on any failure. A broken edit
/// must never take the classifier down mid-flight.
fn reload_rules(handle: &ClassifierHandle, path: &Path) {
    match fs::read_to_string(path) {
        Ok(raw) => match ClassifierEngine::from_toml_str(&raw) {
            Ok(engine) => {
                handle.replace(engine);
                info!(path = %path.display(), "classifier rules reloaded");
            }
            Err(e) => {
                warn!(path = %path.display(), error = ?e, "rejected classifier config, keeping current rules");
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = ?e, "classifier config unreadable");
        }
    }
}

/* ----------------------------
Tests
---------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    fn baked() -> ClassifierEngine {
        ClassifierEngine::from_toml_str(DEFAULT_CLASSIFIER_TOML).expect("load default config")
    }

    #[test]
    fn empty_input_yields_defaults_with_zero_confidence() {
        let eng = baked();
        let c = eng.classify("");
        assert_eq!(c.content_type.label, ContentType::General);
        assert_eq!(c.content_type.confidence, 0.0);
        assert!(c.content_type.matched.is_empty());
        assert_eq!(c.verification.label, VerificationStatus::Unverified);
        assert_eq!(c.verification.confidence, 0.0);
        assert_eq!(c.provenance.label, Provenance::Original);
        assert_eq!(c.provenance.confidence, 0.0);
        assert!(c.provenance.cited_sources.is_empty());
    }

    #[test]
    fn classification_is_deterministic() {
        let eng = baked();
        let text = "BREAKING: Ministry of Defense confirmed strikes near Kharkiv, per Reuters. More to follow. @warmonitor";
        let a = eng.classify(text);
        let b = eng.classify(text);
        assert_eq!(a, b);
    }

    #[test]
    fn breaking_cue_wins_content_type() {
        let eng = baked();
        let c = eng.classify("BREAKING: explosions reported in the city center");
        assert_eq!(c.content_type.label, ContentType::Breaking);
        assert!(c.content_type.confidence > 0.0);
        assert!(!c.content_type.matched.is_empty());
    }

    #[test]
    fn denial_language_sets_verification_denied() {
        let eng = baked();
        let c = eng.classify("The ministry denied the reports of a border incursion.");
        assert_eq!(c.verification.label, VerificationStatus::Denied);
    }

    #[test]
    fn provenance_tie_resolves_to_official() {
        // Two rules with equal weight, text matching both. Priority order
        // must pick official over media on an exact tie.
        const TOML: &str = r#"
[classifier]
min_confidence = 0.3

[[provenance]]
id = "official_statement"
category = "official"
pattern = "(?i)\\bofficial statement\\b"
weight = 0.5

[[provenance]]
id = "wire_citation"
category = "media"
pattern = "(?i)\\baccording to reuters\\b"
weight = 0.5
"#;
        let eng = ClassifierEngine::from_toml_str(TOML).expect("load");
        let c = eng.classify("Official statement released, according to Reuters.");
        assert_eq!(c.provenance.label, Provenance::Official);
        assert!((c.provenance.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn same_family_matches_are_dampened() {
        const TOML: &str = r#"
[classifier]
min_confidence = 0.3

[[content_type]]
id = "alpha"
category = "report"
pattern = "(?i)\\balpha\\b"
weight = 0.6
family = "cue"

[[content_type]]
id = "beta"
category = "report"
pattern = "(?i)\\bbeta\\b"
weight = 0.4
family = "cue"

[[content_type]]
id = "gamma"
category = "report"
pattern = "(?i)\\bgamma\\b"
weight = 0.4
"#;
        let eng = ClassifierEngine::from_toml_str(TOML).expect("load");

        // Same family: 0.6 + 0.4 * 0.5 = 0.8, not 1.0.
        let c = eng.classify("alpha beta");
        assert!((c.content_type.confidence - 0.8).abs() < 1e-6);

        // Independent family stacks at full weight, capped at 1.0.
        let c = eng.classify("alpha beta gamma");
        assert!((c.content_type.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn repeated_matches_of_one_rule_each_contribute() {
        const TOML: &str = r#"
[classifier]
min_confidence = 0.3

[[content_type]]
id = "strong"
category = "breaking"
pattern = "(?i)\\balpha\\b"
weight = 0.6

[[verification]]
id = "weak"
category = "developing"
pattern = "(?i)\\bomega\\b"
weight = 0.2
"#;
        let eng = ClassifierEngine::from_toml_str(TOML).expect("load");

        // Three hits of one rule: 0.6 + 0.3 + 0.15, capped at 1.0.
        let c = eng.classify("alpha alpha alpha");
        assert_eq!(c.content_type.label, ContentType::Breaking);
        assert!((c.content_type.confidence - 1.0).abs() < 1e-6);
        assert_eq!(c.content_type.matched, vec!["strong".to_string()]);

        // A weak cue repeated can cross the floor: 0.2 + 0.1 + 0.05.
        let c = eng.classify("omega omega omega");
        assert!((c.verification.confidence - 0.35).abs() < 1e-6);
        assert!(c.verification.confidence >= eng.min_confidence());
    }

    #[test]
    fn low_score_still_produces_the_top_category() {
        const TOML: &str = r#"
[classifier]
min_confidence = 0.3

[[verification]]
id = "hedge"
category = "developing"
pattern = "(?i)\\bongoing\\b"
weight = 0.2
"#;
        let eng = ClassifierEngine::from_toml_str(TOML).expect("load");
        let c = eng.classify("The situation is ongoing.");
        // Below the floor, but the axis still reports the winning label.
        assert_eq!(c.verification.label, VerificationStatus::Developing);
        assert!((c.verification.confidence - 0.2).abs() < 1e-6);
    }

    #[test]
    fn cited_sources_extracted_and_capped() {
        let cited = extract_cited_sources(
            "Strikes reported via Reuters, per Al Jazeera, according to DeepState. \
             Mentions: @one_two @three4 @five5 @six66",
        );
        assert_eq!(cited.len(), MAX_CITED_SOURCES);
        assert_eq!(cited[0], "Reuters");
        assert_eq!(cited[1], "Al Jazeera");
        assert_eq!(cited[2], "DeepState");
        assert_eq!(cited[3], "@one_two");
    }

    #[test]
    fn lowercase_prose_after_keyword_is_not_cited() {
        let cited = extract_cited_sources("Shelling intensity rose to 40 strikes per day.");
        assert!(cited.is_empty());
    }

    #[test]
    fn unknown_category_is_a_config_error() {
        const TOML: &str = r#"
[classifier]
min_confidence = 0.3

[[content_type]]
id = "bad"
category = "sensational"
pattern = "x"
weight = 0.5
"#;
        let err = ClassifierEngine::from_toml_str(TOML).unwrap_err();
        assert!(err.to_string().contains("unknown category"));
    }

    #[test]
    fn anon_hash_is_stable_and_short() {
        assert_eq!(anon_hash("abc"), anon_hash("abc"));
        assert_eq!(anon_hash("abc").len(), 12);
        assert_ne!(anon_hash("abc"), anon_hash("abd"));
    }
}
