//! contest-alerts binary entrypoint.
//! Loads config, wires sources, filter, ledger and notifier, then polls until Ctrl-C / SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use contest_alerts::config::AppConfig;
use contest_alerts::ingest::scheduler::{run_until, SchedulerCfg};
use contest_alerts::{notify, telemetry, PollCycle};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing()?;

    let cfg = AppConfig::load()?;

    if let Some(addr) = cfg.metrics_addr.as_deref() {
        let bound = telemetry::install_metrics_exporter(addr)?;
        tracing::info!(%bound, "prometheus exporter listening");
    }

    let notifier = notify::from_config(&cfg.discord);
    let cycle = Arc::new(PollCycle::from_config(&cfg, notifier)?);

    tracing::info!(
        sources = ?cycle.source_names(),
        ledger = %cfg.ledger_path.display(),
        interval_secs = cfg.poll_interval_secs,
        "contest-alerts started"
    );

    let sched = SchedulerCfg {
        interval: Duration::from_secs(cfg.poll_interval_secs),
    };
    run_until(&cycle, sched, shutdown_signal()).await;
    Ok(())
}
