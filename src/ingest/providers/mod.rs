pub mod reddit;
pub mod robots;
pub mod rss_feed;
pub mod web_page;

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

pub const DEFAULT_USER_AGENT: &str = concat!("contest-alerts/", env!("CARGO_PKG_VERSION"));

/// Upper bound for any single server-requested wait.
const MAX_RETRY_WAIT: Duration = Duration::from_secs(120);

/// Exponential backoff: 500ms, 1s, 2s, ... for attempt 1, 2, 3, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(8);
    Duration::from_millis(500u64 << shift)
}

/// `Retry-After` in seconds, capped. HTTP-date values are ignored.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| Duration::from_secs_f64(secs).min(MAX_RETRY_WAIT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn retry_after_parses_seconds_and_caps() {
        let mut h = HeaderMap::new();
        assert_eq!(retry_after(&h), None);
        h.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(retry_after(&h), Some(Duration::from_secs(3)));
        h.insert(RETRY_AFTER, HeaderValue::from_static("9999"));
        assert_eq!(retry_after(&h), Some(MAX_RETRY_WAIT));
        h.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&h), None);
    }
}
