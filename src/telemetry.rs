// src/telemetry.rs
//! Logging and metrics setup shared by the binaries.

use std::net::SocketAddr;

use anyhow::{anyhow, Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "contest_alerts=info,warn";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

/// `RUST_LOG` wins over the default filter. `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json = std::env::var(ENV_LOG_FORMAT)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    res.map_err(|e| anyhow!("tracing init: {e}"))
}

/// Install the Prometheus recorder with its own HTTP listener serving `/metrics`.
/// Must be called from inside a tokio runtime.
pub fn install_metrics_exporter(addr: &str) -> Result<SocketAddr> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid metrics address {addr:?}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install recorder")?;

    crate::pipeline::ensure_metrics_described();
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_metrics_address() {
        assert!(install_metrics_exporter("not-an-addr").is_err());
    }
}
