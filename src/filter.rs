// src/filter.rs
//! Keyword filter: decides whether a candidate item is worth an alert.
//!
//! Checks run in a fixed order and the first failing one rejects:
//! score threshold, approval ratio, negative terms, positive terms, media URL.
//! The numeric checks come first so the substring scans only run on items that
//! could still pass.

use std::collections::{BTreeSet, HashMap};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ingest::types::CandidateItem;

pub const DEFAULT_SCORE_THRESHOLD: i64 = 50;
pub const THRESHOLD_DEFAULT_KEY: &str = "DEFAULT";

pub const DEFAULT_POSITIVE_TERMS: &[&str] = &[
    "contest",
    "competition",
    "challenge",
    "prize",
    "submission",
    "ai contest",
    "ai challenge",
    "hackathon",
    "art battle",
    "film contest",
    "annual",
    "festival",
];

pub const DEFAULT_MEDIA_SUFFIXES: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".gifv", ".webp", ".bmp", ".mp4", ".webm", ".mov", ".avi",
    ".mkv",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Positive term occurs anywhere in the haystack.
    #[default]
    Substring,
    /// Positive term occurs on word boundaries (`\bterm\b`).
    WholeWord,
}

/// Per-source engagement thresholds with a `DEFAULT` fallback.
///
/// In config this is a flat table: `{ DEFAULT = 50, AICompetitions = 10 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, i64>", into = "HashMap<String, i64>")]
pub struct ScoreThresholds {
    pub default: i64,
    pub per_source: HashMap<String, i64>,
}

impl ScoreThresholds {
    pub fn new(default: i64) -> Self {
        Self {
            default,
            per_source: HashMap::new(),
        }
    }

    pub fn with_source(mut self, source_key: impl Into<String>, threshold: i64) -> Self {
        self.per_source.insert(source_key.into(), threshold);
        self
    }

    pub fn for_source(&self, source_key: &str) -> i64 {
        self.per_source
            .get(source_key)
            .copied()
            .unwrap_or(self.default)
    }
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self::new(DEFAULT_SCORE_THRESHOLD)
    }
}

impl From<HashMap<String, i64>> for ScoreThresholds {
    fn from(mut map: HashMap<String, i64>) -> Self {
        let default = map
            .remove(THRESHOLD_DEFAULT_KEY)
            .unwrap_or(DEFAULT_SCORE_THRESHOLD);
        Self {
            default,
            per_source: map,
        }
    }
}

impl From<ScoreThresholds> for HashMap<String, i64> {
    fn from(t: ScoreThresholds) -> Self {
        let mut map = t.per_source;
        map.insert(THRESHOLD_DEFAULT_KEY.to_string(), t.default);
        map
    }
}

/// Filter configuration as it appears in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPolicy {
    pub positive_terms: Vec<String>,
    pub negative_terms: Vec<String>,
    /// When false, the positive-term check is skipped (dedicated contest sources).
    pub require_positive_match: bool,
    pub score_thresholds: ScoreThresholds,
    /// Items must be strictly above this. Sources without a ratio skip the check.
    pub min_approval_ratio: f64,
    pub match_mode: MatchMode,
    /// Empty disables the media URL check.
    pub media_suffixes: Vec<String>,
    /// When false, link-only posts are hashed and matched on their title alone.
    pub include_link_body: bool,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            positive_terms: DEFAULT_POSITIVE_TERMS.iter().map(|s| s.to_string()).collect(),
            negative_terms: Vec::new(),
            require_positive_match: true,
            score_thresholds: ScoreThresholds::default(),
            min_approval_ratio: 0.0,
            match_mode: MatchMode::Substring,
            media_suffixes: DEFAULT_MEDIA_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            include_link_body: true,
        }
    }
}

/// The first check an item failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    BelowScoreThreshold { score: i64, threshold: i64 },
    LowApprovalRatio { ratio: f64, min: f64 },
    NegativeTerm(String),
    NoPositiveTerm,
    MediaUrl(String),
}

impl Rejection {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::BelowScoreThreshold { .. } => "score",
            Rejection::LowApprovalRatio { .. } => "approval",
            Rejection::NegativeTerm(_) => "negative_term",
            Rejection::NoPositiveTerm => "no_positive_term",
            Rejection::MediaUrl(_) => "media_url",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// `matched` is the positive term that qualified the item (`None` when not required).
    Accepted { matched: Option<String> },
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }
}

#[derive(Debug)]
struct PositiveTerm {
    text: String,
    word: Option<Regex>,
}

impl PositiveTerm {
    fn occurs_in(&self, haystack: &str) -> bool {
        match &self.word {
            Some(re) => re.is_match(haystack),
            None => haystack.contains(&self.text),
        }
    }
}

/// A compiled `FilterPolicy`.
#[derive(Debug)]
pub struct KeywordFilter {
    positive: Vec<PositiveTerm>,
    negative: Vec<String>,
    require_positive_match: bool,
    thresholds: ScoreThresholds,
    min_approval_ratio: f64,
    media_suffixes: Vec<String>,
    include_link_body: bool,
}

impl KeywordFilter {
    pub fn new(policy: FilterPolicy) -> anyhow::Result<Self> {
        let positive = clean_terms(policy.positive_terms)
            .into_iter()
            .map(|text| {
                let word = match policy.match_mode {
                    MatchMode::Substring => None,
                    MatchMode::WholeWord => {
                        let pattern = format!(r"\b{}\b", regex::escape(&text));
                        Some(Regex::new(&pattern).map_err(|e| {
                            anyhow::anyhow!("positive term `{}` regex error: {}", text, e)
                        })?)
                    }
                };
                Ok(PositiveTerm { text, word })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        if !policy.min_approval_ratio.is_finite() {
            anyhow::bail!("min_approval_ratio must be a finite number");
        }

        let media_suffixes = clean_terms(policy.media_suffixes)
            .into_iter()
            .map(|s| if s.starts_with('.') { s } else { format!(".{s}") })
            .collect();

        Ok(Self {
            positive,
            negative: clean_terms(policy.negative_terms),
            require_positive_match: policy.require_positive_match,
            thresholds: policy.score_thresholds,
            min_approval_ratio: policy.min_approval_ratio,
            media_suffixes,
            include_link_body: policy.include_link_body,
        })
    }

    pub fn include_link_body(&self) -> bool {
        self.include_link_body
    }

    pub fn accept(&self, item: &CandidateItem) -> bool {
        self.evaluate(item).is_accepted()
    }

    pub fn evaluate(&self, item: &CandidateItem) -> Verdict {
        if let Some(score) = item.engagement_score {
            let threshold = self.thresholds.for_source(&item.source_key);
            if score <= threshold {
                return Verdict::Rejected(Rejection::BelowScoreThreshold { score, threshold });
            }
        }

        if let Some(ratio) = item.approval_ratio {
            if ratio <= self.min_approval_ratio {
                return Verdict::Rejected(Rejection::LowApprovalRatio {
                    ratio,
                    min: self.min_approval_ratio,
                });
            }
        }

        let haystack = self.haystack(item);

        if let Some(term) = self.negative.iter().find(|t| haystack.contains(t.as_str())) {
            return Verdict::Rejected(Rejection::NegativeTerm(term.clone()));
        }

        let matched = if self.require_positive_match {
            match self.positive.iter().find(|t| t.occurs_in(&haystack)) {
                Some(term) => Some(term.text.clone()),
                None => return Verdict::Rejected(Rejection::NoPositiveTerm),
            }
        } else {
            None
        };

        if let Some(suffix) = self.media_suffix(&item.url) {
            return Verdict::Rejected(Rejection::MediaUrl(suffix.to_string()));
        }

        Verdict::Accepted { matched }
    }

    /// Lowercased `title + " " + body`; no separator when there is no body.
    pub fn haystack(&self, item: &CandidateItem) -> String {
        let body = item.effective_body(self.include_link_body);
        if body.is_empty() {
            item.title.to_lowercase()
        } else {
            format!("{} {}", item.title.to_lowercase(), body.to_lowercase())
        }
    }

    fn media_suffix(&self, url: &str) -> Option<&str> {
        // compare the path only: preview links often carry `?width=..`
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        self.media_suffixes
            .iter()
            .find(|s| path.ends_with(s.as_str()))
            .map(String::as_str)
    }
}

/// Stateless form of [`KeywordFilter::accept`].
pub fn accept(item: &CandidateItem, policy: &FilterPolicy) -> anyhow::Result<bool> {
    Ok(KeywordFilter::new(policy.clone())?.accept(item))
}

fn clean_terms(items: Vec<String>) -> Vec<String> {
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim().to_lowercase();
        if !t.is_empty() {
            set.insert(t);
        }
    }
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::SourceDetails;

    fn post(title: &str, body: &str, score: i64) -> CandidateItem {
        CandidateItem {
            title: title.into(),
            body: body.into(),
            source_key: "AICompetitions".into(),
            url: "https://www.reddit.com/r/AICompetitions/comments/x1".into(),
            engagement_score: Some(score),
            approval_ratio: Some(0.95),
            details: SourceDetails::Reddit {
                subreddit: "AICompetitions".into(),
                score,
                comments: 3,
                is_self: true,
                permalink: "/r/AICompetitions/comments/x1".into(),
            },
        }
    }

    #[test]
    fn threshold_is_strictly_greater_than() {
        let f = KeywordFilter::new(FilterPolicy::default()).unwrap();
        assert!(!f.accept(&post("AI contest", "", 50)));
        assert!(f.accept(&post("AI contest", "", 51)));
    }

    #[test]
    fn mixed_case_config_terms_still_match() {
        let policy = FilterPolicy {
            positive_terms: vec!["  AI Contest ".into(), "".into()],
            ..FilterPolicy::default()
        };
        let f = KeywordFilter::new(policy).unwrap();
        assert_eq!(
            f.evaluate(&post("Weekly AI CONTEST thread", "", 90)),
            Verdict::Accepted {
                matched: Some("ai contest".into())
            }
        );
    }

    #[test]
    fn whole_word_mode_ignores_embedded_matches() {
        let policy = FilterPolicy {
            positive_terms: vec!["prize".into()],
            match_mode: MatchMode::WholeWord,
            ..FilterPolicy::default()
        };
        let f = KeywordFilter::new(policy.clone()).unwrap();
        assert!(!f.accept(&post("Surprized by the new model", "", 90)));
        assert!(f.accept(&post("Prize pool announced", "", 90)));

        let substring = KeywordFilter::new(FilterPolicy {
            match_mode: MatchMode::Substring,
            ..policy
        })
        .unwrap();
        assert!(substring.accept(&post("Surprized by the new model", "", 90)));
    }

    #[test]
    fn haystack_omits_separator_without_body() {
        let f = KeywordFilter::new(FilterPolicy::default()).unwrap();
        assert_eq!(f.haystack(&post("Title", "", 1)), "title");
        assert_eq!(f.haystack(&post("Title", "Body", 1)), "title body");
    }

    #[test]
    fn approval_ratio_checked_only_when_present() {
        let policy = FilterPolicy {
            min_approval_ratio: 0.9,
            ..FilterPolicy::default()
        };
        let f = KeywordFilter::new(policy).unwrap();

        let mut low = post("AI contest", "", 90);
        low.approval_ratio = Some(0.5);
        assert_eq!(
            f.evaluate(&low),
            Verdict::Rejected(Rejection::LowApprovalRatio { ratio: 0.5, min: 0.9 })
        );

        let mut none = post("AI contest", "", 90);
        none.approval_ratio = None;
        assert!(f.accept(&none));
    }

    #[test]
    fn media_check_ignores_query_string() {
        let f = KeywordFilter::new(FilterPolicy::default()).unwrap();
        let mut item = post("AI art contest winner", "", 90);
        item.url = "https://i.redd.it/abc.PNG?width=640".into();
        assert_eq!(
            f.evaluate(&item),
            Verdict::Rejected(Rejection::MediaUrl(".png".into()))
        );
    }

    #[test]
    fn thresholds_deserialize_from_flat_table() {
        let t: ScoreThresholds = toml::from_str("DEFAULT = 20\nAIArt = 100\n").unwrap();
        assert_eq!(t.for_source("AIArt"), 100);
        assert_eq!(t.for_source("OpenAI"), 20);

        let missing_default: ScoreThresholds = toml::from_str("AIArt = 5\n").unwrap();
        assert_eq!(missing_default.default, DEFAULT_SCORE_THRESHOLD);
    }
}
