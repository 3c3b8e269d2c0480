// src/ingest/scheduler.rs
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::pipeline::PollCycle;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
}

/// Run poll cycles back to back, one per tick, until `shutdown` resolves.
///
/// Cycles never overlap: a slow cycle delays the next tick instead of stacking.
/// Shutdown during a cycle drops it; the ledger is only replaced by a completed save.
/// Returns the number of cycles that ran to completion.
pub async fn run_until<F>(cycle: &PollCycle, cfg: SchedulerCfg, shutdown: F) -> u64
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut completed = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!(target: "scheduler", "shutdown during poll cycle, discarding it");
                break;
            }
            report = cycle.run_once() => {
                completed += 1;
                counter!("alerts_cycles_total").increment(1);
                tracing::debug!(target: "scheduler", cycle = completed, ?report, "tick done");
            }
        }
    }

    tracing::info!(target: "scheduler", cycles = completed, "scheduler stopped");
    completed
}

/// Spawn the scheduler on the runtime. Abort the handle to stop it.
pub fn spawn_scheduler(cycle: Arc<PollCycle>, cfg: SchedulerCfg) -> JoinHandle<u64> {
    tokio::spawn(async move { run_until(&cycle, cfg, std::future::pending::<()>()).await })
}
