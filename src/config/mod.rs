// src/config/mod.rs
//! Runtime configuration: a TOML file for lists and thresholds, environment for secrets
//! and deployment overrides.
//!
//! Resolution order for the file:
//! 1) `$CONTEST_ALERTS_CONFIG` (must exist when set)
//! 2) `config/contest_alerts.toml`
//! 3) built-in defaults

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::filter::{FilterPolicy, ScoreThresholds};
use crate::ingest::providers::reddit::RedditCredentials;
use crate::ingest::providers::rss_feed::FeedConfig;
use crate::ingest::providers::web_page::WebPageConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/contest_alerts.toml";
pub const ENV_CONFIG_PATH: &str = "CONTEST_ALERTS_CONFIG";

pub const ENV_LEDGER_PATH: &str = "ALERTS_LEDGER_PATH";
pub const ENV_POLL_INTERVAL_SECS: &str = "POLL_INTERVAL_SECS";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "FETCH_TIMEOUT_SECS";
pub const ENV_METRICS_ADDR: &str = "METRICS_ADDR";

pub const ENV_DISCORD_TOKEN: &str = "DISCORD_TOKEN";
pub const ENV_DISCORD_CHANNEL_ID: &str = "DISCORD_CHANNEL_ID";
pub const ENV_DISCORD_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";

pub const ENV_REDDIT_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const ENV_REDDIT_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
pub const ENV_REDDIT_USER_AGENT: &str = "REDDIT_USER_AGENT";

pub const DEFAULT_SUBREDDITS: &[&str] = &[
    "AICompetitions",
    "AIArt",
    "ArtificialInteligence",
    "aivideo",
    "ChatGPT",
    "aipromptprogramming",
    "SunoAI",
    "singularity",
    "StableDiffusion",
    "weirddalle",
    "MidJourney",
    "Artificial",
    "OpenAI",
    "runwayml",
];

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_nonempty(key) {
        Some(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("{key}={v:?}: {e}")),
        None => Ok(None),
    }
}

/// Policy for sources that only list competitions: no keyword requirement,
/// no engagement signal, media URLs still dropped.
pub fn listing_policy() -> FilterPolicy {
    FilterPolicy {
        require_positive_match: false,
        score_thresholds: ScoreThresholds::new(0),
        ..FilterPolicy::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditSourceConfig {
    pub enabled: bool,
    pub subreddits: Vec<String>,
    /// Posts per subreddit from the `hot` listing.
    pub limit: u32,
    pub request_pause_ms: u64,
    pub max_retries: u32,
    /// Replaces the global policy for Reddit.
    pub policy: Option<FilterPolicy>,
    #[serde(skip)]
    pub client_id: Option<String>,
    #[serde(skip)]
    pub client_secret: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for RedditSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subreddits: DEFAULT_SUBREDDITS.iter().map(|s| s.to_string()).collect(),
            limit: 10,
            request_pause_ms: 1_000,
            max_retries: 3,
            policy: None,
            client_id: None,
            client_secret: None,
            user_agent: None,
        }
    }
}

impl RedditSourceConfig {
    /// `None` when the id or secret is missing.
    pub fn credentials(&self) -> Option<RedditCredentials> {
        Some(RedditCredentials {
            client_id: self.client_id.clone()?,
            client_secret: self.client_secret.clone()?,
            user_agent: self.user_agent.clone().unwrap_or_else(|| {
                crate::ingest::providers::DEFAULT_USER_AGENT.to_string()
            }),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    #[serde(skip)]
    pub token: Option<String>,
    pub channel_id: Option<u64>,
    #[serde(skip)]
    pub webhook_url: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
    pub max_retries: u8,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            channel_id: None,
            webhook_url: None,
            api_base: "https://discord.com/api/v10".to_string(),
            timeout_secs: 10,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ledger_path: PathBuf,
    pub poll_interval_secs: u64,
    /// Per-source budget; a source that overruns contributes nothing this cycle.
    pub fetch_timeout_secs: u64,
    /// User agent for page and feed requests.
    pub user_agent: Option<String>,
    pub metrics_addr: Option<String>,
    /// Default policy; sources may replace it with their own `policy` table.
    pub policy: FilterPolicy,
    pub reddit: RedditSourceConfig,
    pub web_pages: Vec<WebPageConfig>,
    pub feeds: Vec<FeedConfig>,
    pub discord: DiscordConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut mlcontests = WebPageConfig::new("mlcontests", "https://mlcontests.com/");
        mlcontests.policy = Some(listing_policy());

        Self {
            ledger_path: PathBuf::from("past_alerts.json"),
            poll_interval_secs: 3_600,
            fetch_timeout_secs: 120,
            user_agent: None,
            metrics_addr: None,
            policy: FilterPolicy::default(),
            reddit: RedditSourceConfig::default(),
            web_pages: vec![mlcontests],
            feeds: vec![FeedConfig {
                name: "aicrowd".to_string(),
                url: "https://www.aicrowd.com/challenges.rss".to_string(),
                policy: Some(listing_policy()),
            }],
            discord: DiscordConfig::default(),
        }
    }
}

impl AppConfig {
    /// Resolve the file, apply environment overrides, validate.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
                }
                Self::from_path(&pb)?
            }
            Err(_) => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_path(default)?
                } else {
                    tracing::info!(target: "config", "no config file, using built-in defaults");
                    Self::default()
                }
            }
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Secrets always come from the environment; the rest only overrides the file.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(p) = env_nonempty(ENV_LEDGER_PATH) {
            self.ledger_path = PathBuf::from(p);
        }
        if let Some(v) = env_parse::<u64>(ENV_POLL_INTERVAL_SECS)? {
            self.poll_interval_secs = v;
        }
        if let Some(v) = env_parse::<u64>(ENV_FETCH_TIMEOUT_SECS)? {
            self.fetch_timeout_secs = v;
        }
        if let Some(v) = env_nonempty(ENV_METRICS_ADDR) {
            self.metrics_addr = Some(v);
        }

        self.discord.token = env_nonempty(ENV_DISCORD_TOKEN);
        self.discord.webhook_url = env_nonempty(ENV_DISCORD_WEBHOOK_URL);
        if let Some(id) = env_parse::<u64>(ENV_DISCORD_CHANNEL_ID)? {
            self.discord.channel_id = Some(id);
        }

        self.reddit.client_id = env_nonempty(ENV_REDDIT_CLIENT_ID);
        self.reddit.client_secret = env_nonempty(ENV_REDDIT_CLIENT_SECRET);
        if let Some(ua) = env_nonempty(ENV_REDDIT_USER_AGENT) {
            self.reddit.user_agent = Some(ua);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be > 0");
        }
        if self.fetch_timeout_secs == 0 {
            bail!("fetch_timeout_secs must be > 0");
        }
        if self.ledger_path.as_os_str().is_empty() {
            bail!("ledger_path must not be empty");
        }
        let mut names = std::collections::HashSet::new();
        let source_names = std::iter::once("reddit")
            .chain(self.web_pages.iter().map(|w| w.name.as_str()))
            .chain(self.feeds.iter().map(|f| f.name.as_str()));
        for name in source_names {
            if name.trim().is_empty() {
                bail!("source names must not be empty");
            }
            if !names.insert(name) {
                bail!("duplicate source name `{name}`");
            }
        }
        Ok(())
    }

    /// A source's own policy, or the global one.
    pub fn policy_for(&self, own: Option<&FilterPolicy>) -> FilterPolicy {
        own.cloned().unwrap_or_else(|| self.policy.clone())
    }
}
