use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::lifecycle::ShutdownSignal;
use crate::scores::ScoreSink;

use super::feed::FileProvider;

/// Onramp once, then re-read the feed and push it every `every` until
/// shutdown. A feed that fails to re-read is pushed as last loaded.
pub fn run_push_loop(
    provider: Arc<FileProvider>,
    sink: Arc<dyn ScoreSink>,
    every: Duration,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = provider.name();
        match sink.onramp(&name, None).await {
            Ok(()) => tracing::info!(provider = %name, "onramped to score store"),
            // the first accepted push registers the provider as well
            Err(e) => tracing::warn!(provider = %name, error = %e, "onramp failed"),
        }

        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tick.tick() => {
                    let feed = match provider.reload().await {
                        Ok(feed) => feed,
                        Err(e) => {
                            tracing::warn!(provider = %name, error = %e, "provider feed reload failed");
                            provider.current()
                        }
                    };
                    match sink.push(&feed.to_update()).await {
                        Ok(()) => tracing::info!(provider = %name, users = feed.scores().len(), "pushed trust scores"),
                        Err(e) => tracing::warn!(provider = %name, error = %e, "score push failed"),
                    }
                }
            }
        }
        tracing::debug!(provider = %name, "provider push loop stopped");
    })
}
