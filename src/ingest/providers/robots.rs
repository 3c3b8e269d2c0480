// src/ingest/providers/robots.rs
//! Minimal robots.txt evaluation: `User-agent` groups with `Allow`/`Disallow` prefixes.
//! Longest matching rule wins; `Allow` wins a tie. Wildcards are not supported.

use reqwest::StatusCode;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRules {
    allow: Vec<String>,
    disallow: Vec<String>,
}

impl RobotsRules {
    /// Everything allowed.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Everything disallowed.
    pub fn deny_all() -> Self {
        Self {
            allow: Vec::new(),
            disallow: vec!["/".to_string()],
        }
    }

    /// Picks the group whose agent equals our product token (case-insensitive);
    /// falls back to `*`.
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let product = user_agent
            .split('/')
            .next()
            .unwrap_or(user_agent)
            .trim()
            .to_ascii_lowercase();

        let mut specific: Option<RobotsRules> = None;
        let mut wildcard: Option<RobotsRules> = None;

        // current group: its agents, its rules, and whether we're still reading agent lines
        let mut agents: Vec<String> = Vec::new();
        let mut rules = RobotsRules::default();
        let mut in_agents = false;

        let mut flush = |agents: &[String], rules: &RobotsRules| {
            for a in agents {
                if a == "*" {
                    wildcard
                        .get_or_insert_with(RobotsRules::default)
                        .merge(rules);
                } else if !a.is_empty() && *a == product {
                    specific
                        .get_or_insert_with(RobotsRules::default)
                        .merge(rules);
                }
            }
        };

        for raw in content.lines() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !in_agents {
                        flush(&agents, &rules);
                        agents.clear();
                        rules = RobotsRules::default();
                        in_agents = true;
                    }
                    agents.push(value.to_ascii_lowercase());
                }
                "allow" => {
                    in_agents = false;
                    if !value.is_empty() {
                        rules.allow.push(value.to_string());
                    }
                }
                "disallow" => {
                    in_agents = false;
                    // empty Disallow means "allow everything"
                    if !value.is_empty() {
                        rules.disallow.push(value.to_string());
                    }
                }
                _ => {}
            }
        }
        flush(&agents, &rules);

        specific.or(wildcard).unwrap_or_default()
    }

    fn merge(&mut self, other: &RobotsRules) {
        self.allow.extend(other.allow.iter().cloned());
        self.disallow.extend(other.disallow.iter().cloned());
    }

    pub fn is_allowed(&self, path: &str) -> bool {
        let longest = |rules: &[String]| {
            rules
                .iter()
                .filter(|r| path.starts_with(r.as_str()))
                .map(String::len)
                .max()
        };
        match (longest(&self.allow), longest(&self.disallow)) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(d)) => a >= d,
        }
    }
}

/// Fetch rules for the origin of `page`.
/// 4xx ⇒ allow all; 5xx ⇒ deny all; transport errors propagate.
pub async fn fetch_rules(
    client: &reqwest::Client,
    page: &Url,
    user_agent: &str,
) -> Result<RobotsRules, reqwest::Error> {
    let mut robots_url = page.clone();
    robots_url.set_path("/robots.txt");
    robots_url.set_query(None);
    robots_url.set_fragment(None);

    let rsp = client.get(robots_url).send().await?;
    let status = rsp.status();
    if status.is_success() {
        let body = rsp.text().await?;
        Ok(RobotsRules::parse(&body, user_agent))
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Ok(RobotsRules::deny_all())
    } else {
        Ok(RobotsRules::allow_all())
    }
}
