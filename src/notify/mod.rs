pub mod discord;
pub mod log;

use std::sync::Arc;

use anyhow::Result;

use crate::config::DiscordConfig;
use crate::ingest::types::CandidateItem;

pub use discord::{DiscordNotifier, DiscordTarget};
pub use log::LogNotifier;

/// Delivery sink for accepted items. Called once per item, in discovery order.
/// Implementations own formatting, delivery and retries.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, item: &CandidateItem) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Discord when a target is configured, otherwise log-only.
pub fn from_config(cfg: &DiscordConfig) -> Arc<dyn Notifier> {
    match DiscordTarget::from_config(cfg) {
        Some(target) => {
            tracing::info!(target: "notify", kind = target.kind(), "discord notifications enabled");
            Arc::new(
                DiscordNotifier::new(target)
                    .with_timeout(cfg.timeout_secs)
                    .with_retries(cfg.max_retries),
            )
        }
        None => {
            tracing::warn!(
                target: "notify",
                "no DISCORD_WEBHOOK_URL or DISCORD_TOKEN + DISCORD_CHANNEL_ID, alerts will only be logged"
            );
            Arc::new(LogNotifier)
        }
    }
}
