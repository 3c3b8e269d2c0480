// src/ingest/providers/reddit.rs
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{backoff_delay, retry_after};
use crate::ingest::types::{CandidateItem, FetchError, SourceDetails, SourceProvider};

pub const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
pub const API_BASE: &str = "https://oauth.reddit.com";
const WEB_BASE: &str = "https://www.reddit.com";

/// Refresh the token this long before Reddit says it expires.
const TOKEN_SLACK_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

/// One submission from a listing, reduced to the fields we use.
#[derive(Debug, Clone, Deserialize)]
pub struct RedditPost {
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    pub subreddit: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
    #[serde(default)]
    pub is_self: bool,
    /// Pinned rule and megathread posts.
    #[serde(default)]
    pub stickied: bool,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: RedditPost,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug)]
struct AccessToken {
    value: String,
    refresh_at: Instant,
}

pub fn parse_listing(json: &str) -> Result<Vec<RedditPost>, FetchError> {
    let listing: Listing =
        serde_json::from_str(json).map_err(|e| FetchError::Parse(format!("reddit listing: {e}")))?;
    Ok(listing.data.children.into_iter().map(|c| c.data).collect())
}

/// Listing posts as candidates, minus stickied posts.
pub fn candidates(posts: Vec<RedditPost>) -> Vec<CandidateItem> {
    posts
        .into_iter()
        .filter(|p| !p.stickied)
        .map(CandidateItem::from)
        .collect()
}

/// Per-subreddit time budget: what is left of `total` after the pauses, split evenly.
/// Never below one second.
pub fn request_budget(total: Duration, pause: Duration, subreddits: usize) -> Duration {
    let n = subreddits.max(1) as u32;
    let pauses = pause.saturating_mul(n - 1);
    (total.saturating_sub(pauses) / n).max(Duration::from_secs(1))
}

impl From<RedditPost> for CandidateItem {
    fn from(post: RedditPost) -> Self {
        let url = if post.url.is_empty() {
            format!("{WEB_BASE}{}", post.permalink)
        } else {
            post.url
        };
        CandidateItem {
            title: post.title,
            body: post.selftext,
            source_key: post.subreddit.clone(),
            url,
            engagement_score: Some(post.score),
            approval_ratio: post.upvote_ratio,
            details: SourceDetails::Reddit {
                subreddit: post.subreddit,
                score: post.score,
                comments: post.num_comments,
                is_self: post.is_self,
                permalink: post.permalink,
            },
        }
    }
}

/// Application-only OAuth client. Constructed once at startup and owned by the provider.
pub struct RedditClient {
    http: reqwest::Client,
    creds: RedditCredentials,
    token_url: String,
    api_base: String,
    max_retries: u32,
    token: Mutex<Option<AccessToken>>,
    resume_at: Mutex<Option<Instant>>,
}

impl RedditClient {
    pub fn new(creds: RedditCredentials) -> Result<Self, FetchError> {
        if creds.client_id.trim().is_empty() || creds.client_secret.trim().is_empty() {
            return Err(FetchError::Config(
                "reddit client id/secret are empty".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .user_agent(creds.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            creds,
            token_url: TOKEN_URL.to_string(),
            api_base: API_BASE.to_string(),
            max_retries: 3,
            token: Mutex::new(None),
            resume_at: Mutex::new(None),
        })
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Point at a different host (local stubs).
    pub fn with_endpoints(mut self, token_url: &str, api_base: &str) -> Self {
        self.token_url = token_url.to_string();
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    async fn access_token(&self) -> Result<String, FetchError> {
        let mut guard = self.token.lock().await;
        if let Some(tok) = guard.as_ref() {
            if Instant::now() < tok.refresh_at {
                return Ok(tok.value.clone());
            }
        }

        let rsp = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.creds.client_id, Some(&self.creds.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(FetchError::Auth(format!(
                "token endpoint returned {status}"
            )));
        }
        let body: TokenResponse = rsp
            .json()
            .await
            .map_err(|e| FetchError::Auth(format!("token response: {e}")))?;
        if let Some(err) = body.error {
            return Err(FetchError::Auth(err));
        }
        let value = body
            .access_token
            .ok_or_else(|| FetchError::Auth("token response without access_token".into()))?;
        let ttl = body.expires_in.unwrap_or(3600).saturating_sub(TOKEN_SLACK_SECS);
        *guard = Some(AccessToken {
            value: value.clone(),
            refresh_at: Instant::now() + Duration::from_secs(ttl),
        });
        tracing::debug!(target: "sources", ttl_secs = ttl, "reddit token refreshed");
        Ok(value)
    }

    /// Sleep while the previous response said the quota is used up.
    /// A pause that would run past `deadline` is left for the next caller.
    async fn wait_for_quota(&self, url: &str, deadline: Instant) -> Result<(), FetchError> {
        let until = {
            let mut guard = self.resume_at.lock().await;
            match *guard {
                Some(until) if until > deadline => {
                    return Err(FetchError::RateLimited(url.to_string()));
                }
                _ => guard.take(),
            }
        };
        if let Some(until) = until {
            if until > Instant::now() {
                tracing::info!(
                    target: "sources",
                    wait_ms = (until - Instant::now()).as_millis() as u64,
                    "reddit quota exhausted, pausing"
                );
                tokio::time::sleep_until(until).await;
            }
        }
        Ok(())
    }

    async fn note_quota(&self, headers: &reqwest::header::HeaderMap) {
        let num = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
        };
        if let (Some(remaining), Some(reset)) =
            (num("x-ratelimit-remaining"), num("x-ratelimit-reset"))
        {
            if remaining < 1.0 && reset.is_finite() && reset > 0.0 {
                *self.resume_at.lock().await =
                    Some(Instant::now() + Duration::from_secs_f64(reset.min(600.0)));
            }
        }
    }

    async fn get_with_backoff(&self, url: &str, deadline: Instant) -> Result<String, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.wait_for_quota(url, deadline).await?;
            let token = self.access_token().await?;
            let rsp = self.http.get(url).bearer_auth(token).send().await?;
            self.note_quota(rsp.headers()).await;

            let status = rsp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                counter!("alerts_rate_limited_total", "source" => "reddit").increment(1);
                if attempt > self.max_retries {
                    return Err(FetchError::RateLimited(url.to_string()));
                }
                let wait = retry_after(rsp.headers()).unwrap_or_else(|| backoff_delay(attempt));
                if Instant::now() + wait > deadline {
                    return Err(FetchError::RateLimited(url.to_string()));
                }
                tracing::warn!(
                    target: "sources",
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    "reddit returned 429, backing off"
                );
                tokio::time::sleep(wait).await;
                continue;
            }
            if status == StatusCode::UNAUTHORIZED && attempt <= self.max_retries {
                // token revoked or expired early
                self.token.lock().await.take();
                continue;
            }
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            return Ok(rsp.text().await?);
        }
    }

    /// `hot` listing of one subreddit. Retries and quota pauses never wait past `deadline`.
    pub async fn hot(
        &self,
        subreddit: &str,
        limit: u32,
        deadline: Instant,
    ) -> Result<Vec<RedditPost>, FetchError> {
        let url = format!(
            "{}/r/{}/hot?limit={}&raw_json=1",
            self.api_base, subreddit, limit
        );
        let body = self.get_with_backoff(&url, deadline).await?;
        parse_listing(&body)
    }
}

enum Mode {
    Fixture(String),
    Http(RedditClient),
}

pub struct RedditProvider {
    mode: Mode,
    subreddits: Vec<String>,
    limit: u32,
    pause: Duration,
    budget: Duration,
}

impl RedditProvider {
    pub fn new(client: RedditClient, subreddits: Vec<String>, limit: u32) -> Self {
        Self {
            mode: Mode::Http(client),
            subreddits,
            limit,
            pause: Duration::from_secs(1),
            budget: Duration::from_secs(30),
        }
    }

    /// Serves one listing JSON document for every fetch.
    pub fn from_fixture(listing_json: &str) -> Self {
        Self {
            mode: Mode::Fixture(listing_json.to_string()),
            subreddits: Vec::new(),
            limit: 0,
            pause: Duration::ZERO,
            budget: Duration::ZERO,
        }
    }

    /// Pause between consecutive subreddit requests.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Time one subreddit may take, retries included. A subreddit that overruns
    /// is dropped on its own; the others are kept.
    pub fn with_request_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    async fn fetch_live(&self, client: &RedditClient) -> Result<Vec<CandidateItem>, FetchError> {
        let mut out = Vec::new();
        let mut last_err = None;
        let mut ok_count = 0usize;

        for (i, sub) in self.subreddits.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            let deadline = Instant::now() + self.budget;
            let res = match tokio::time::timeout_at(deadline, client.hot(sub, self.limit, deadline))
                .await
            {
                Ok(res) => res,
                Err(_) => Err(FetchError::Timeout(self.budget)),
            };
            match res {
                Ok(posts) => {
                    ok_count += 1;
                    out.extend(candidates(posts));
                }
                Err(e) => {
                    tracing::warn!(target: "sources", subreddit = %sub, error = %e, "subreddit fetch failed");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if ok_count == 0 => Err(e),
            _ => Ok(out),
        }
    }
}

#[async_trait]
impl SourceProvider for RedditProvider {
    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, FetchError> {
        let items = match &self.mode {
            Mode::Fixture(json) => candidates(parse_listing(json)?),
            Mode::Http(client) => self.fetch_live(client).await?,
        };
        counter!("alerts_fetched_total", "source" => "reddit").increment(items.len() as u64);
        Ok(items)
    }

    fn name(&self) -> &str {
        "reddit"
    }
}
