use anyhow::Result;

use super::Notifier;
use crate::ingest::types::CandidateItem;

/// Fallback sink when Discord is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, item: &CandidateItem) -> Result<()> {
        tracing::info!(
            target: "notify",
            source = item.source().as_str(),
            source_key = %item.source_key,
            title = %item.title,
            url = %item.url,
            "new competition"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
