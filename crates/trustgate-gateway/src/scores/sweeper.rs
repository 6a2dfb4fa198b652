use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::lifecycle::ShutdownSignal;
use crate::obs::metrics::GatewayMetrics;

use super::store::ScoreStore;

/// Periodic stale-score eviction until shutdown.
pub fn spawn_sweeper(
    store: Arc<ScoreStore>,
    every: Duration,
    metrics: Arc<GatewayMetrics>,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tick.tick() => {
                    let report = store.sweep();
                    if report.evicted > 0 {
                        metrics.score_evictions.add(&[], report.evicted as u64);
                        tracing::info!(evicted = report.evicted, remaining = store.len(), "score sweep");
                    }
                    if !report.aging.is_empty() {
                        metrics.score_aging.add(&[], report.aging.len() as u64);
                        tracing::debug!(aging = report.aging.len(), "scores past the old threshold");
                    }
                }
            }
        }
        tracing::debug!("score sweeper stopped");
    })
}
