// src/ingest/providers/web_page.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{backoff_delay, retry_after, robots, DEFAULT_USER_AGENT};
use crate::filter::FilterPolicy;
use crate::ingest::clean_markup;
use crate::ingest::types::{CandidateItem, FetchError, SourceDetails, SourceProvider};

pub const DEFAULT_DEADLINE_FORMAT: &str = "%d/%m/%Y";

fn default_item_selector() -> String {
    "div.contest-item".to_string()
}
fn default_title_selector() -> String {
    "h2".to_string()
}
fn default_link_selector() -> String {
    "a".to_string()
}
fn default_deadline_format() -> String {
    DEFAULT_DEADLINE_FORMAT.to_string()
}
fn default_true() -> bool {
    true
}

/// A contest listing page scraped with CSS selectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebPageConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_item_selector")]
    pub item_selector: String,
    /// Relative to each item.
    #[serde(default = "default_title_selector")]
    pub title_selector: String,
    /// Relative to each item; the `href` of the first match.
    #[serde(default = "default_link_selector")]
    pub link_selector: String,
    #[serde(default)]
    pub description_selector: Option<String>,
    /// Where to look for a `d/m/yyyy`-shaped date. Falls back to the description.
    #[serde(default)]
    pub deadline_selector: Option<String>,
    /// chrono format applied to the matched date, e.g. `%d/%m/%Y` or `%m/%d/%Y`.
    #[serde(default = "default_deadline_format")]
    pub deadline_format: String,
    #[serde(default = "default_true")]
    pub respect_robots: bool,
    /// Replaces the global filter policy for this page.
    #[serde(default)]
    pub policy: Option<FilterPolicy>,
}

impl WebPageConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            item_selector: default_item_selector(),
            title_selector: default_title_selector(),
            link_selector: default_link_selector(),
            description_selector: None,
            deadline_selector: None,
            deadline_format: default_deadline_format(),
            respect_robots: true,
            policy: None,
        }
    }
}

struct Selectors {
    item: Selector,
    title: Selector,
    link: Selector,
    description: Option<Selector>,
    deadline: Option<Selector>,
}

fn selector(s: &str) -> Result<Selector, FetchError> {
    Selector::parse(s).map_err(|e| FetchError::Config(format!("selector `{s}`: {e}")))
}

impl Selectors {
    fn compile(cfg: &WebPageConfig) -> Result<Self, FetchError> {
        Ok(Self {
            item: selector(&cfg.item_selector)?,
            title: selector(&cfg.title_selector)?,
            link: selector(&cfg.link_selector)?,
            description: cfg.description_selector.as_deref().map(selector).transpose()?,
            deadline: cfg.deadline_selector.as_deref().map(selector).transpose()?,
        })
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    clean_markup(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

/// First `d/m/yyyy`-shaped token in `text`, parsed with `format`.
/// Unparsable dates yield `None`; the day/month order is whatever `format` says.
pub fn parse_deadline(text: &str, format: &str) -> Option<NaiveDate> {
    static RE_DATE: OnceCell<Regex> = OnceCell::new();
    let re = RE_DATE.get_or_init(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{4}\b").expect("date regex"));
    let m = re.find(text)?;
    NaiveDate::parse_from_str(m.as_str(), format).ok()
}

/// Extract candidates from a listing page. Entries without a title are skipped.
pub fn parse_page(
    html: &str,
    page_url: &Url,
    cfg: &WebPageConfig,
) -> Result<Vec<CandidateItem>, FetchError> {
    let sel = Selectors::compile(cfg)?;
    let doc = Html::parse_document(html);

    let mut out = Vec::new();
    for entry in doc.select(&sel.item) {
        let Some(title) = first_text(entry, &sel.title) else {
            continue;
        };

        let url = entry
            .select(&sel.link)
            .find_map(|a| a.value().attr("href"))
            .and_then(|href| page_url.join(href.trim()).ok())
            .map(String::from)
            .unwrap_or_else(|| page_url.to_string());

        let description = sel
            .description
            .as_ref()
            .and_then(|s| first_text(entry, s))
            .unwrap_or_default();

        let deadline_src = sel
            .deadline
            .as_ref()
            .and_then(|s| first_text(entry, s))
            .unwrap_or_else(|| description.clone());
        let deadline = parse_deadline(&deadline_src, &cfg.deadline_format);

        out.push(CandidateItem {
            title,
            body: description,
            source_key: cfg.name.clone(),
            url,
            engagement_score: None,
            approval_ratio: None,
            details: SourceDetails::Web {
                site: cfg.name.clone(),
                deadline,
            },
        });
    }
    Ok(out)
}

enum Mode {
    Fixture(String),
    Http {
        client: reqwest::Client,
        user_agent: String,
        max_retries: u32,
    },
}

pub struct WebPageProvider {
    cfg: WebPageConfig,
    mode: Mode,
}

impl WebPageProvider {
    pub fn new(cfg: WebPageConfig, user_agent: Option<&str>) -> Result<Self, FetchError> {
        let user_agent = user_agent.unwrap_or(DEFAULT_USER_AGENT).to_string();
        let client = reqwest::Client::builder()
            .user_agent(user_agent.clone())
            .build()?;
        Ok(Self {
            cfg,
            mode: Mode::Http {
                client,
                user_agent,
                max_retries: 2,
            },
        })
    }

    pub fn from_fixture(cfg: WebPageConfig, html: &str) -> Self {
        Self {
            cfg,
            mode: Mode::Fixture(html.to_string()),
        }
    }

    fn page_url(&self) -> Result<Url, FetchError> {
        Url::parse(&self.cfg.url)
            .map_err(|e| FetchError::Config(format!("page url `{}`: {e}", self.cfg.url)))
    }

    async fn download(
        &self,
        client: &reqwest::Client,
        page: &Url,
        max_retries: u32,
    ) -> Result<String, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let rsp = client.get(page.clone()).send().await?;
            let status = rsp.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt <= max_retries {
                let wait = retry_after(rsp.headers()).unwrap_or_else(|| backoff_delay(attempt));
                tracing::warn!(target: "sources", site = %self.cfg.name, wait_ms = wait.as_millis() as u64, "page returned 429, backing off");
                tokio::time::sleep(wait).await;
                continue;
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(FetchError::RateLimited(page.to_string()));
            }
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url: page.to_string(),
                });
            }
            return Ok(rsp.text().await?);
        }
    }
}

#[async_trait]
impl SourceProvider for WebPageProvider {
    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, FetchError> {
        let page = self.page_url()?;
        let items = match &self.mode {
            Mode::Fixture(html) => parse_page(html, &page, &self.cfg)?,
            Mode::Http {
                client,
                user_agent,
                max_retries,
            } => {
                if self.cfg.respect_robots {
                    let rules = robots::fetch_rules(client, &page, user_agent).await?;
                    if !rules.is_allowed(page.path()) {
                        return Err(FetchError::Disallowed(page.to_string()));
                    }
                }
                let html = self.download(client, &page, *max_retries).await?;
                parse_page(&html, &page, &self.cfg)?
            }
        };
        counter!("alerts_fetched_total", "source" => "web").increment(items.len() as u64);
        Ok(items)
    }

    fn name(&self) -> &str {
        &self.cfg.name
    }
}
