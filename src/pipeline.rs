// src/pipeline.rs
//! One poll cycle: fetch every source, drop already-alerted items, filter,
//! notify, record, save the ledger once.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use tokio::task::JoinSet;

use crate::config::AppConfig;
use crate::filter::{KeywordFilter, Verdict};
use crate::fingerprint::item_fingerprint;
use crate::ingest::providers::reddit::{request_budget, RedditClient, RedditProvider};
use crate::ingest::providers::rss_feed::RssFeedProvider;
use crate::ingest::providers::web_page::WebPageProvider;
use crate::ingest::types::{CandidateItem, FetchError, SourceProvider};
use crate::ledger::{AlertLedger, AlertStore};
use crate::notify::Notifier;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("alerts_fetched_total", "Candidates returned by sources.");
        describe_counter!(
            "alerts_duplicate_total",
            "Candidates skipped because their fingerprint was already alerted."
        );
        describe_counter!(
            "alerts_rejected_total",
            "Candidates rejected by the keyword filter."
        );
        describe_counter!("alerts_notified_total", "Alerts handed to the notifier.");
        describe_counter!(
            "alerts_notify_errors_total",
            "Alerts the notifier failed to deliver."
        );
        describe_counter!(
            "alerts_source_errors_total",
            "Source fetches that failed or timed out."
        );
        describe_counter!(
            "alerts_rate_limited_total",
            "HTTP 429 responses from sources."
        );
        describe_counter!(
            "alerts_ledger_save_errors_total",
            "Failed ledger saves."
        );
        describe_counter!("alerts_cycles_total", "Poll cycles run to completion.");
        describe_histogram!("alerts_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("alerts_ledger_size", "Fingerprints in the alert ledger.");
        describe_gauge!(
            "alerts_cycle_last_run_ts",
            "Unix ts when the last poll cycle finished."
        );
    });
}

/// Counts for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub notified: usize,
    pub notify_failures: usize,
    pub source_errors: usize,
    pub saved: bool,
}

struct SourceSlot {
    provider: Arc<dyn SourceProvider>,
    filter: Arc<KeywordFilter>,
}

pub struct PollCycle {
    sources: Vec<SourceSlot>,
    store: AlertStore,
    notifier: Arc<dyn Notifier>,
    fetch_timeout: Duration,
}

impl PollCycle {
    pub fn new(store: AlertStore, notifier: Arc<dyn Notifier>, fetch_timeout: Duration) -> Self {
        Self {
            sources: Vec::new(),
            store,
            notifier,
            fetch_timeout,
        }
    }

    /// Sources are processed in the order they are added.
    pub fn with_source(
        mut self,
        provider: Arc<dyn SourceProvider>,
        filter: Arc<KeywordFilter>,
    ) -> Self {
        self.sources.push(SourceSlot { provider, filter });
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.provider.name()).collect()
    }

    pub fn store(&self) -> &AlertStore {
        &self.store
    }

    /// Build every configured source. Reddit is skipped (with a warning) without credentials.
    pub fn from_config(cfg: &AppConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let mut cycle = PollCycle::new(
            AlertStore::new(cfg.ledger_path.clone()),
            notifier,
            Duration::from_secs(cfg.fetch_timeout_secs),
        );

        if cfg.reddit.enabled {
            match cfg.reddit.credentials() {
                Some(creds) => {
                    let client = RedditClient::new(creds)?.with_retries(cfg.reddit.max_retries);
                    let pause = Duration::from_millis(cfg.reddit.request_pause_ms);
                    // leave headroom under the source timeout
                    let budget = request_budget(
                        Duration::from_secs(cfg.fetch_timeout_secs) * 9 / 10,
                        pause,
                        cfg.reddit.subreddits.len(),
                    );
                    let provider = RedditProvider::new(
                        client,
                        cfg.reddit.subreddits.clone(),
                        cfg.reddit.limit,
                    )
                    .with_pause(pause)
                    .with_request_budget(budget);
                    let filter = KeywordFilter::new(cfg.policy_for(cfg.reddit.policy.as_ref()))?;
                    cycle = cycle.with_source(Arc::new(provider), Arc::new(filter));
                }
                None => tracing::warn!(
                    target: "pipeline",
                    "reddit enabled but REDDIT_CLIENT_ID / REDDIT_CLIENT_SECRET missing, skipping"
                ),
            }
        }

        for page in &cfg.web_pages {
            let filter = KeywordFilter::new(cfg.policy_for(page.policy.as_ref()))?;
            let provider = WebPageProvider::new(page.clone(), cfg.user_agent.as_deref())?;
            cycle = cycle.with_source(Arc::new(provider), Arc::new(filter));
        }

        for feed in &cfg.feeds {
            let filter = KeywordFilter::new(cfg.policy_for(feed.policy.as_ref()))?;
            let provider = RssFeedProvider::new(feed.clone(), cfg.user_agent.as_deref())?;
            cycle = cycle.with_source(Arc::new(provider), Arc::new(filter));
        }

        Ok(cycle)
    }

    /// Runs one full cycle. Never fails: per-source and per-item problems are logged
    /// and counted, and a failed save leaves already-sent notifications in place.
    pub async fn run_once(&self) -> CycleReport {
        ensure_metrics_described();

        let mut ledger = self.store.load().await;
        let mut report = CycleReport::default();

        let outcomes = self.fetch_all().await;
        let now = Utc::now();

        for (slot, outcome) in self.sources.iter().zip(outcomes) {
            let name = slot.provider.name();
            let items = match outcome {
                Some(Ok(items)) => {
                    ledger.mark_checked(name, now);
                    items
                }
                Some(Err(e)) => {
                    tracing::warn!(target: "pipeline", source = name, error = %e, "source failed, skipping");
                    counter!("alerts_source_errors_total").increment(1);
                    report.source_errors += 1;
                    continue;
                }
                None => {
                    tracing::error!(target: "pipeline", source = name, "source task aborted, skipping");
                    counter!("alerts_source_errors_total").increment(1);
                    report.source_errors += 1;
                    continue;
                }
            };

            report.fetched += items.len();
            for item in items {
                self.process_item(&mut ledger, &slot.filter, item, &mut report)
                    .await;
            }
        }

        match self.store.save(&ledger).await {
            Ok(()) => report.saved = true,
            Err(e) => {
                tracing::error!(
                    target: "pipeline",
                    path = %self.store.path().display(),
                    error = format!("{e:#}"),
                    "ledger save failed"
                );
                counter!("alerts_ledger_save_errors_total").increment(1);
            }
        }

        gauge!("alerts_ledger_size").set(ledger.len() as f64);
        gauge!("alerts_cycle_last_run_ts").set(Utc::now().timestamp().max(0) as f64);

        tracing::info!(
            target: "pipeline",
            fetched = report.fetched,
            duplicates = report.duplicates,
            rejected = report.rejected,
            notified = report.notified,
            source_errors = report.source_errors,
            saved = report.saved,
            "poll cycle finished"
        );
        report
    }

    /// Fetch all sources concurrently. Result order matches `self.sources`;
    /// `None` marks a task that panicked.
    async fn fetch_all(&self) -> Vec<Option<Result<Vec<CandidateItem>, FetchError>>> {
        let mut set = JoinSet::new();
        for (idx, slot) in self.sources.iter().enumerate() {
            let provider = Arc::clone(&slot.provider);
            let limit = self.fetch_timeout;
            set.spawn(async move {
                let res = match tokio::time::timeout(limit, provider.fetch_latest()).await {
                    Ok(res) => res,
                    Err(_) => Err(FetchError::Timeout(limit)),
                };
                (idx, res)
            });
        }

        let mut out: Vec<Option<Result<Vec<CandidateItem>, FetchError>>> =
            (0..self.sources.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, res)) => out[idx] = Some(res),
                Err(e) => tracing::error!(target: "pipeline", error = %e, "source task failed"),
            }
        }
        out
    }

    async fn process_item(
        &self,
        ledger: &mut AlertLedger,
        filter: &KeywordFilter,
        item: CandidateItem,
        report: &mut CycleReport,
    ) {
        let fp = item_fingerprint(&item, filter.include_link_body());
        if ledger.contains(&fp) {
            report.duplicates += 1;
            counter!("alerts_duplicate_total").increment(1);
            return;
        }

        match filter.evaluate(&item) {
            Verdict::Rejected(why) => {
                report.rejected += 1;
                counter!("alerts_rejected_total", "reason" => why.label()).increment(1);
                tracing::debug!(
                    target: "pipeline",
                    fingerprint = fp.short(),
                    source_key = %item.source_key,
                    reason = ?why,
                    "rejected"
                );
            }
            Verdict::Accepted { matched } => {
                match self.notifier.notify(&item).await {
                    Ok(()) => {
                        report.notified += 1;
                        counter!("alerts_notified_total").increment(1);
                        tracing::info!(
                            target: "pipeline",
                            fingerprint = fp.short(),
                            source_key = %item.source_key,
                            matched = matched.as_deref().unwrap_or("-"),
                            title = %item.title,
                            "alert sent"
                        );
                    }
                    Err(e) => {
                        // recorded anyway: the sink owns retries
                        report.notify_failures += 1;
                        counter!("alerts_notify_errors_total").increment(1);
                        tracing::error!(
                            target: "pipeline",
                            fingerprint = fp.short(),
                            notifier = self.notifier.name(),
                            error = format!("{e:#}"),
                            "notification failed"
                        );
                    }
                }
                ledger.record(fp);
            }
        }
    }
}
