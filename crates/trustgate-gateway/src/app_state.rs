//! Shared application state for the trustGate gateway.
//!
//! One explicit context object built at startup: which roles are active, the
//! collaborators they talk to, metrics, and the shutdown trigger that stops
//! every background loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use trustgate_core::error::Result;

use crate::config::GatewayConfig;
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::obs::metrics::GatewayMetrics;
use crate::policy::{spawn_reload_watcher, ConfigSource, DecisionPoint, FileConfigSource};
use crate::provider::{run_push_loop, FileProvider};
use crate::scores::{spawn_sweeper, AgeThresholds, HttpScoreClient, ScoreSink, ScoreSource, ScoreStore};
use crate::script::{ScriptLimits, ScriptRuntime};
use crate::transport::{Authorizer, HttpAuthorizer};

/// Role components. `AppState::new` builds them from config; tests may
/// assemble them directly.
#[derive(Default)]
pub struct Components {
    pub store: Option<Arc<ScoreStore>>,
    pub decisions: Option<Arc<DecisionPoint>>,
    pub policy_source: Option<Arc<dyn ConfigSource>>,
    pub authorizer: Option<Arc<dyn Authorizer>>,
    pub provider: Option<Arc<FileProvider>>,
    pub provider_sink: Option<Arc<dyn ScoreSink>>,
    pub metrics: Arc<GatewayMetrics>,
}

impl Components {
    pub async fn from_config(cfg: &GatewayConfig) -> Result<Self> {
        let runtime = ScriptRuntime::new(ScriptLimits {
            memory_limit_bytes: cfg.script.memory_limit_bytes,
            max_instructions: cfg.script.max_instructions,
        });
        let metrics = Arc::new(GatewayMetrics::default());

        let store = cfg.scores.as_ref().map(|s| {
            Arc::new(ScoreStore::new(
                runtime.clone(),
                AgeThresholds {
                    old: Duration::from_secs(s.old_after_secs),
                    stale: Duration::from_secs(s.stale_after_secs),
                },
            ))
        });

        let mut decisions = None;
        let mut policy_source = None;
        if let Some(section) = &cfg.decisions {
            let scores: Arc<dyn ScoreSource> = match (&section.score_store, &store) {
                (Some(url), _) => Arc::new(HttpScoreClient::new(url)?),
                (None, Some(local)) => local.clone(),
                (None, None) => unreachable_role("decisions", "scores")?,
            };
            let dp = Arc::new(DecisionPoint::new(
                scores,
                runtime.clone(),
                Duration::from_millis(section.cache_ttl_ms),
                Arc::clone(&metrics),
            ));
            let source: Arc<dyn ConfigSource> = Arc::new(FileConfigSource::new(&section.policy_file));
            // startup fails on an unusable policy file; later reloads keep the last good set
            dp.reload_from(source.as_ref()).await?;
            decisions = Some(dp);
            policy_source = Some(source);
        }

        let mut authorizer = None;
        if let Some(p) = &cfg.proxy {
            let remote_or_local: Arc<dyn Authorizer> = match (&p.decision_point, &decisions) {
                (Some(url), _) => Arc::new(HttpAuthorizer::new(url)?),
                (None, Some(local)) => local.clone(),
                (None, None) => unreachable_role("proxy", "decisions")?,
            };
            authorizer = Some(remote_or_local);
        }

        let mut provider = None;
        let mut provider_sink = None;
        if let Some(p) = &cfg.provider {
            let sink: Arc<dyn ScoreSink> = match (&p.score_store, &store) {
                (Some(url), _) => Arc::new(HttpScoreClient::new(url)?),
                (None, Some(local)) => local.clone(),
                (None, None) => unreachable_role("provider", "scores")?,
            };
            provider = Some(Arc::new(FileProvider::open(&p.name, &p.file).await?));
            provider_sink = Some(sink);
        }

        Ok(Self {
            store,
            decisions,
            policy_source,
            authorizer,
            provider,
            provider_sink,
            metrics,
        })
    }
}

fn unreachable_role<T>(role: &str, needs: &str) -> Result<T> {
    Err(trustgate_core::TrustGateError::Config(format!(
        "{role} needs a remote url or a local {needs} section"
    )))
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    parts: Components,
    shutdown: Shutdown,
}

impl AppState {
    /// Build every configured role. Performs the initial policy load.
    pub async fn new(cfg: GatewayConfig) -> Result<Self> {
        let parts = Components::from_config(&cfg).await?;
        Ok(Self::from_components(cfg, parts))
    }

    pub fn from_components(cfg: GatewayConfig, parts: Components) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                parts,
                shutdown: Shutdown::new(),
            }),
        }
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn store(&self) -> Option<Arc<ScoreStore>> {
        self.inner.parts.store.clone()
    }

    pub fn decisions(&self) -> Option<Arc<DecisionPoint>> {
        self.inner.parts.decisions.clone()
    }

    pub fn authorizer(&self) -> Option<Arc<dyn Authorizer>> {
        self.inner.parts.authorizer.clone()
    }

    pub fn provider(&self) -> Option<Arc<FileProvider>> {
        self.inner.parts.provider.clone()
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.inner.parts.metrics)
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.inner.shutdown.signal()
    }

    /// Flip readiness to draining and stop background loops.
    pub fn begin_shutdown(&self) {
        self.inner.parts.metrics.set_draining();
        self.inner.shutdown.trigger();
    }

    pub fn is_draining(&self) -> bool {
        self.inner.parts.metrics.is_draining()
    }

    /// Extra gauge lines for `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let mut extra = Vec::new();
        if let Some(store) = &self.inner.parts.store {
            extra.push(("trustgate_scores_stored", store.len() as u64));
        }
        if let Some(dp) = &self.inner.parts.decisions {
            extra.push(("trustgate_policy_generation", dp.generation()));
            extra.push(("trustgate_decision_cache_entries", dp.cache().len() as u64));
        }
        extra
    }

    /// Start the sweep, reload-watch and provider-push loops of the active
    /// roles. They all stop on `begin_shutdown`.
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let cfg = self.cfg();
        let parts = &self.inner.parts;
        let mut tasks = Vec::new();

        if let (Some(section), Some(store)) = (&cfg.scores, &parts.store) {
            tasks.push(spawn_sweeper(
                Arc::clone(store),
                Duration::from_millis(section.sweep_interval_ms),
                self.metrics(),
                self.shutdown_signal(),
            ));
        }
        if let (Some(section), Some(dp), Some(source)) =
            (&cfg.decisions, &parts.decisions, &parts.policy_source)
        {
            tasks.push(spawn_reload_watcher(
                Arc::clone(dp),
                Arc::clone(source),
                Duration::from_millis(section.reload_poll_ms),
                self.shutdown_signal(),
            ));
        }
        if let (Some(section), Some(provider), Some(sink)) =
            (&cfg.provider, &parts.provider, &parts.provider_sink)
        {
            tasks.push(run_push_loop(
                Arc::clone(provider),
                Arc::clone(sink),
                Duration::from_millis(section.push_interval_ms),
                self.shutdown_signal(),
            ));
        }
        tasks
    }
}
