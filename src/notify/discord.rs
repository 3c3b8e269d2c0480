use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::Notifier;
use crate::config::DiscordConfig;
use crate::ingest::providers::{backoff_delay, retry_after};
use crate::ingest::types::{CandidateItem, SourceDetails};

const HEADLINE: &str = "**New AI Competition Found!**";
// Discord embed limits
const MAX_TITLE_CHARS: usize = 256;
const MAX_EXCERPT_CHARS: usize = 300;

#[derive(Clone)]
pub enum DiscordTarget {
    Webhook(String),
    /// Bot token posting into a channel through the REST API.
    Channel {
        token: String,
        channel_id: u64,
        api_base: String,
    },
}

impl DiscordTarget {
    /// Bot channel wins when both are configured.
    pub fn from_config(cfg: &DiscordConfig) -> Option<Self> {
        let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        match (non_empty(&cfg.token), cfg.channel_id, non_empty(&cfg.webhook_url)) {
            (Some(token), Some(channel_id), _) => Some(DiscordTarget::Channel {
                token,
                channel_id,
                api_base: cfg.api_base.trim_end_matches('/').to_string(),
            }),
            (_, _, Some(url)) => Some(DiscordTarget::Webhook(url)),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DiscordTarget::Webhook(_) => "webhook",
            DiscordTarget::Channel { .. } => "channel",
        }
    }
}

// never print the token or webhook secret
impl fmt::Debug for DiscordTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscordTarget::Webhook(_) => f.write_str("Webhook(..)"),
            DiscordTarget::Channel { channel_id, .. } => {
                write!(f, "Channel {{ channel_id: {channel_id} }}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    target: DiscordTarget,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(target: DiscordTarget) -> Self {
        Self {
            target,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    fn request(&self, payload: &DiscordMessage) -> reqwest::RequestBuilder {
        let req = match &self.target {
            DiscordTarget::Webhook(url) => self.client.post(url),
            DiscordTarget::Channel {
                token,
                channel_id,
                api_base,
            } => self
                .client
                .post(format!("{api_base}/channels/{channel_id}/messages"))
                .header(reqwest::header::AUTHORIZATION, format!("Bot {token}")),
        };
        req.timeout(self.timeout).json(payload)
    }

    pub async fn send_item(&self, item: &CandidateItem) -> Result<()> {
        let payload = DiscordMessage::for_item(item);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self.request(&payload).send().await;

            match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    if attempt >= self.max_retries {
                        return Err(anyhow!("Discord HTTP error: {status}"));
                    }
                    let wait = if status == StatusCode::TOO_MANY_REQUESTS {
                        let header_wait = retry_after(rsp.headers());
                        let body_wait = rsp
                            .json::<RateLimitBody>()
                            .await
                            .ok()
                            .and_then(|b| b.wait());
                        body_wait.or(header_wait).unwrap_or_else(|| backoff_delay(attempt.into()))
                    } else {
                        backoff_delay(attempt.into())
                    };
                    tracing::warn!(target: "notify", %status, attempt, wait_ms = wait.as_millis() as u64, "discord send failed, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(anyhow!("Discord request failed: {e}"));
                    }
                    tokio::time::sleep(backoff_delay(attempt.into())).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, item: &CandidateItem) -> Result<()> {
        self.send_item(item).await
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

impl RateLimitBody {
    fn wait(&self) -> Option<Duration> {
        self.retry_after
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(|s| Duration::from_secs_f64(s.min(120.0)))
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DiscordEmbed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub description: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DiscordMessage {
    pub content: Option<String>,
    pub embeds: Vec<DiscordEmbed>,
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

impl DiscordMessage {
    pub fn for_item(item: &CandidateItem) -> Self {
        let mut description = match &item.details {
            SourceDetails::Reddit {
                subreddit,
                score,
                comments,
                ..
            } => format!("r/{subreddit} · {score} points · {comments} comments"),
            SourceDetails::Web { site, deadline } => match deadline {
                Some(d) => format!("{site} · deadline {}", d.format("%Y-%m-%d")),
                None => site.clone(),
            },
            SourceDetails::Rss { feed, .. } => feed.clone(),
        };
        let excerpt = item.body.trim();
        if !excerpt.is_empty() {
            description.push_str("\n\n");
            description.push_str(&truncate_chars(excerpt, MAX_EXCERPT_CHARS));
        }

        Self {
            content: Some(HEADLINE.to_string()),
            embeds: vec![DiscordEmbed {
                title: truncate_chars(&item.title, MAX_TITLE_CHARS),
                url: Some(item.url.clone()).filter(|u| !u.is_empty()),
                description,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn web_item(body: &str) -> CandidateItem {
        CandidateItem {
            title: "Vision Challenge 2026".into(),
            body: body.into(),
            source_key: "mlcontests".into(),
            url: "https://mlcontests.com/vision".into(),
            engagement_score: None,
            approval_ratio: None,
            details: SourceDetails::Web {
                site: "mlcontests".into(),
                deadline: NaiveDate::from_ymd_opt(2026, 4, 3),
            },
        }
    }

    #[test]
    fn web_item_embed_carries_deadline() {
        let msg = DiscordMessage::for_item(&web_item(""));
        assert_eq!(msg.content.as_deref(), Some(HEADLINE));
        let embed = &msg.embeds[0];
        assert_eq!(embed.title, "Vision Challenge 2026");
        assert_eq!(embed.url.as_deref(), Some("https://mlcontests.com/vision"));
        assert_eq!(embed.description, "mlcontests · deadline 2026-04-03");
    }

    #[test]
    fn long_body_is_truncated() {
        let msg = DiscordMessage::for_item(&web_item(&"x".repeat(1000)));
        let desc = &msg.embeds[0].description;
        assert!(desc.ends_with('…'));
        assert!(desc.chars().count() < 400);
    }

    #[test]
    fn channel_target_preferred_and_debug_hides_token() {
        let cfg = DiscordConfig {
            token: Some("secret-token".into()),
            channel_id: Some(42),
            webhook_url: Some("https://discord.com/api/webhooks/1/abc".into()),
            ..DiscordConfig::default()
        };
        let target = DiscordTarget::from_config(&cfg).unwrap();
        assert_eq!(target.kind(), "channel");
        assert!(!format!("{target:?}").contains("secret"));

        let webhook_only = DiscordConfig {
            token: Some("  ".into()),
            channel_id: Some(42),
            webhook_url: Some("https://discord.com/api/webhooks/1/abc".into()),
            ..DiscordConfig::default()
        };
        assert_eq!(
            DiscordTarget::from_config(&webhook_only).unwrap().kind(),
            "webhook"
        );
        assert!(DiscordTarget::from_config(&DiscordConfig::default()).is_none());
    }
}
