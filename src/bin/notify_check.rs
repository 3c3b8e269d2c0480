//! Sends one sample alert through the configured notifier (log-only when Discord is not set up).
//! Handy for checking DISCORD_* settings without waiting for a real match.

use anyhow::Result;
use chrono::Utc;
use contest_alerts::config::AppConfig;
use contest_alerts::{notify, CandidateItem, SourceDetails};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    contest_alerts::telemetry::init_tracing()?;

    let cfg = AppConfig::load()?;
    let notifier = notify::from_config(&cfg.discord);

    let item = CandidateItem {
        title: format!("Test alert {}", Utc::now().format("%Y-%m-%d %H:%M:%S")),
        body: "This is a notify_check message; no action needed.".into(),
        source_key: "notify_check".into(),
        url: "https://www.aicrowd.com/challenges".into(),
        engagement_score: None,
        approval_ratio: None,
        details: SourceDetails::Rss {
            feed: "notify_check".into(),
            published_at: None,
        },
    };

    notifier.notify(&item).await?;
    println!("notify-check sent via {}", notifier.name());
    Ok(())
}
