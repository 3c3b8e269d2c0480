// src/ingest/types.rs
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

/// Which collaborator produced an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Reddit,
    Web,
    Rss,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Reddit => "reddit",
            SourceKind::Web => "web",
            SourceKind::Rss => "rss",
        }
    }
}

/// Source-specific fields, decoded once at the fetch boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceDetails {
    Reddit {
        subreddit: String,
        score: i64,
        comments: u64,
        is_self: bool,
        permalink: String,
    },
    Web {
        site: String,
        deadline: Option<NaiveDate>,
    },
    Rss {
        feed: String,
        published_at: Option<u64>, // unix seconds
    },
}

/// A prospective alert. Built fresh every poll cycle; only its fingerprint is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateItem {
    pub title: String,
    pub body: String,
    /// Subreddit, site or feed name. Keys the per-source score thresholds.
    pub source_key: String,
    pub url: String,
    /// Popularity signal (upvotes). `None` when the source has no such concept.
    pub engagement_score: Option<i64>,
    /// In `[0, 1]`. `None` when the source has no such concept.
    pub approval_ratio: Option<f64>,
    pub details: SourceDetails,
}

impl CandidateItem {
    pub fn source(&self) -> SourceKind {
        match self.details {
            SourceDetails::Reddit { .. } => SourceKind::Reddit,
            SourceDetails::Web { .. } => SourceKind::Web,
            SourceDetails::Rss { .. } => SourceKind::Rss,
        }
    }

    /// Posts that only carry a link: Reddit link submissions, and page entries
    /// without a description.
    pub fn is_link_only(&self) -> bool {
        match &self.details {
            SourceDetails::Reddit { is_self, .. } => !is_self,
            SourceDetails::Web { .. } => self.body.is_empty(),
            SourceDetails::Rss { .. } => false,
        }
    }

    /// Body text used for hashing and keyword matching.
    /// With `include_link_body == false`, link-only items contribute no body.
    pub fn effective_body(&self, include_link_body: bool) -> &str {
        if !include_link_body && self.is_link_only() {
            ""
        } else {
            &self.body
        }
    }
}

/// Why a single source produced nothing this cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("rate limited by {0}, retries exhausted")]
    RateLimited(String),
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("robots.txt disallows {0}")]
    Disallowed(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("invalid source configuration: {0}")]
    Config(String),
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, FetchError>;
    fn name(&self) -> &str;
}
