use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use super::DEFAULT_USER_AGENT;
use crate::filter::FilterPolicy;
use crate::ingest::clean_markup;
use crate::ingest::types::{CandidateItem, FetchError, SourceDetails, SourceProvider};

/// An RSS 2.0 feed of challenges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    /// Replaces the global filter policy for this feed.
    #[serde(default)]
    pub policy: Option<FilterPolicy>,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<u64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
}

// quick-xml only knows the XML entities; feeds routinely use HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Parse an RSS document into candidates. Items without a title are skipped.
pub fn parse_feed(xml: &str, feed_name: &str) -> Result<Vec<CandidateItem>, FetchError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss =
        from_str(&xml_clean).map_err(|e| FetchError::Parse(format!("{feed_name} rss: {e}")))?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let title = clean_markup(it.title.as_deref().unwrap_or_default());
        if title.is_empty() {
            continue;
        }
        out.push(CandidateItem {
            title,
            body: clean_markup(it.description.as_deref().unwrap_or_default()),
            source_key: feed_name.to_string(),
            url: it.link.map(|l| l.trim().to_string()).unwrap_or_default(),
            engagement_score: None,
            approval_ratio: None,
            details: SourceDetails::Rss {
                feed: feed_name.to_string(),
                published_at: it.pub_date.as_deref().and_then(parse_rfc2822_to_unix),
            },
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("alerts_feed_parse_ms").record(ms);
    Ok(out)
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

pub struct RssFeedProvider {
    cfg: FeedConfig,
    mode: Mode,
}

impl RssFeedProvider {
    pub fn new(cfg: FeedConfig, user_agent: Option<&str>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .build()?;
        Ok(Self {
            cfg,
            mode: Mode::Http { client },
        })
    }

    pub fn from_fixture(cfg: FeedConfig, xml: &str) -> Self {
        Self {
            cfg,
            mode: Mode::Fixture(xml.to_string()),
        }
    }
}

#[async_trait]
impl SourceProvider for RssFeedProvider {
    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, FetchError> {
        let items = match &self.mode {
            Mode::Fixture(s) => parse_feed(s, &self.cfg.name)?,
            Mode::Http { client } => {
                let rsp = client.get(&self.cfg.url).send().await?;
                let status = rsp.status();
                if !status.is_success() {
                    return Err(FetchError::Status {
                        status: status.as_u16(),
                        url: self.cfg.url.clone(),
                    });
                }
                let body = rsp.text().await?;
                parse_feed(&body, &self.cfg.name)?
            }
        };
        counter!("alerts_fetched_total", "source" => "rss").increment(items.len() as u64);
        Ok(items)
    }

    fn name(&self) -> &str {
        &self.cfg.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc2822_dates_parse_to_unix() {
        assert_eq!(
            parse_rfc2822_to_unix("Thu, 01 Jan 1970 00:01:00 +0000"),
            Some(60)
        );
        assert_eq!(parse_rfc2822_to_unix("yesterday"), None);
    }

    #[test]
    fn empty_channel_yields_nothing() {
        let xml = r#"<rss version="2.0"><channel><title>x</title></channel></rss>"#;
        assert!(parse_feed(xml, "aicrowd").unwrap().is_empty());
    }
}
