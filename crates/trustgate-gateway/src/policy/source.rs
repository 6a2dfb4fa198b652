//! Where policy text comes from, and the polling watcher that turns file
//! changes into `DecisionPoint::reload_from` calls.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use trustgate_core::error::{Result, TrustGateError};

use crate::lifecycle::ShutdownSignal;

use super::engine::DecisionPoint;

#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn describe(&self) -> String;
    async fn load(&self) -> Result<String>;

    /// Opaque marker that changes whenever `load` would return new text.
    /// `None` means the source never changes and is not watched.
    async fn revision(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Policy YAML on disk.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn modified(&self) -> Result<SystemTime> {
        tokio::fs::metadata(&self.path)
            .await
            .and_then(|m| m.modified())
            .map_err(|e| TrustGateError::Config(format!("stat {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| TrustGateError::Config(format!("read {}: {e}", self.path.display())))
    }

    async fn revision(&self) -> Result<Option<String>> {
        let modified = self.modified().await?;
        let nanos = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Ok(Some(nanos.to_string()))
    }
}

/// Policy text held in memory.
#[derive(Debug, Clone)]
pub struct StaticConfigSource(pub String);

#[async_trait]
impl ConfigSource for StaticConfigSource {
    fn describe(&self) -> String {
        "inline".to_string()
    }

    async fn load(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Poll `source` for revision changes and reload on change. Also purges
/// expired decision cache entries on every tick.
pub fn spawn_reload_watcher(
    decisions: Arc<DecisionPoint>,
    source: Arc<dyn ConfigSource>,
    every: Duration,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_seen = source.revision().await.ok().flatten();
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tick.tick() => {
                    let purged = decisions.cache().purge_expired_at(Instant::now());
                    if purged > 0 {
                        tracing::trace!(purged, "decision cache purged");
                    }

                    let revision = match source.revision().await {
                        Ok(Some(r)) => r,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::warn!(source = %source.describe(), error = %e, "policy source not readable");
                            continue;
                        }
                    };
                    if last_seen.as_deref() == Some(revision.as_str()) {
                        continue;
                    }
                    last_seen = Some(revision);
                    tracing::info!(source = %source.describe(), "policy source changed, reloading");
                    // failure already logged; previous generation keeps serving
                    let _ = decisions.reload_from(source.as_ref()).await;
                }
            }
        }
        tracing::debug!("policy watcher stopped");
    })
}
