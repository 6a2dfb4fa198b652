use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde_json::json;

use trustgate_core::error::Result;
use trustgate_core::protocol::api::ScoreAnswer;

use crate::obs::metrics::GatewayMetrics;
use crate::scores::ScoreSource;
use crate::script::{ScriptEnv, ScriptRuntime};

use super::cache::{DecisionCache, DecisionKey};
use super::document::PolicySet;
use super::source::ConfigSource;

/// Global name of the fetched score table inside policy predicates.
pub const SCORES_TABLE: &str = "scores";

/// Alias of `scores` accepted for policy files that read them as `dte`.
pub const SCORES_ALIAS: &str = "dte";

/// Why a request was denied without an evaluation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// User is not a member of any group.
    UnknownUser,
    /// The selected policy evaluated to false.
    PolicyRejected { policy: String },
    /// No policy applies (default deny).
    NoMatchingPolicy,
}

/// Outcome of one uncached evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed { policy: String },
    Denied(DenyReason),
    /// Score fetch or predicate execution failed. Callers must deny.
    EvaluationFailed { policy: String, cause: String },
}

impl Decision {
    /// Boundary mapping: only `Allowed` grants access.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Allowed { .. } => "allowed",
            Decision::Denied(DenyReason::UnknownUser) => "unknown_user",
            Decision::Denied(DenyReason::PolicyRejected { .. }) => "rejected",
            Decision::Denied(DenyReason::NoMatchingPolicy) => "default_deny",
            Decision::EvaluationFailed { .. } => "failed",
        }
    }
}

/// Policy decision point: active policy generation, score source and cache.
pub struct DecisionPoint {
    active: RwLock<Arc<PolicySet>>,
    scores: Arc<dyn ScoreSource>,
    runtime: ScriptRuntime,
    cache: DecisionCache,
    metrics: Arc<GatewayMetrics>,
}

impl DecisionPoint {
    /// Starts at generation 0, which denies everything until the first reload.
    pub fn new(
        scores: Arc<dyn ScoreSource>,
        runtime: ScriptRuntime,
        cache_ttl: Duration,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            active: RwLock::new(Arc::new(PolicySet::empty())),
            scores,
            runtime,
            cache: DecisionCache::new(cache_ttl),
            metrics,
        }
    }

    /// Generation in effect right now. In-flight evaluations keep theirs.
    pub fn snapshot(&self) -> Arc<PolicySet> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation()
    }

    pub fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    /// Parse and swap in a new generation. On error the active one is kept.
    pub fn reload(&self, text: &str) -> Result<u64> {
        let mut next = match PolicySet::parse(text, &self.runtime) {
            Ok(set) => set,
            Err(e) => {
                self.metrics.policy_reloads.inc(&[("result", "error")]);
                tracing::error!(error = %e, generation = self.generation(), "could not reload policies, keeping active generation");
                return Err(e);
            }
        };

        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        let generation = active.generation() + 1;
        next.set_generation(generation);
        tracing::info!(
            generation,
            policies = next.policies().len(),
            "policies reloaded"
        );
        *active = Arc::new(next);
        drop(active);

        self.metrics.policy_reloads.inc(&[("result", "ok")]);
        Ok(generation)
    }

    pub async fn reload_from(&self, source: &dyn ConfigSource) -> Result<u64> {
        let text = match source.load().await {
            Ok(t) => t,
            Err(e) => {
                self.metrics.policy_reloads.inc(&[("result", "error")]);
                tracing::error!(source = %source.describe(), error = %e, "could not read policy source");
                return Err(e);
            }
        };
        self.reload(&text)
    }

    /// Uncached evaluation against the current generation.
    pub async fn evaluate(&self, user: &str, resource_group: &str, resource: &str) -> Decision {
        let started = Instant::now();
        let decision = self.evaluate_inner(user, resource_group, resource).await;
        self.metrics
            .policy_decisions
            .inc(&[("outcome", decision.outcome())]);
        self.metrics
            .decision_duration
            .observe(&[], started.elapsed());
        decision
    }

    async fn evaluate_inner(&self, user: &str, resource_group: &str, resource: &str) -> Decision {
        let set = self.snapshot();

        let Some(groups) = set.groups_of(user) else {
            tracing::warn!(user = %user, resource_group = %resource_group, resource = %resource, "user is not recognized by any group");
            return Decision::Denied(DenyReason::UnknownUser);
        };

        let Some(policy) = set.select(resource_group, resource, groups) else {
            tracing::warn!(user = %user, resource_group = %resource_group, resource = %resource, "--DENY-- default deny, no policy applies");
            return Decision::Denied(DenyReason::NoMatchingPolicy);
        };
        tracing::debug!(policy = %policy.name(), user = %user, "applying policy");

        let vars = if policy.required_keys().is_empty() {
            ScoreAnswer::new()
        } else {
            match self.scores.get_scores(user, policy.required_keys()).await {
                Ok(vars) => vars,
                Err(e) => {
                    tracing::warn!(policy = %policy.name(), user = %user, resource_group = %resource_group, resource = %resource, error = %e, "score fetch failed, denying");
                    return Decision::EvaluationFailed {
                        policy: policy.name().to_string(),
                        cause: e.to_string(),
                    };
                }
            }
        };

        let table = json!(vars);
        let env = ScriptEnv::new()
            .bind(SCORES_ALIAS, table.clone())
            .bind(SCORES_TABLE, table);
        // Runs on the calling task: predicates are short and bounded by the
        // instruction budget.
        match self.runtime.execute(policy.predicate(), &env) {
            Err(e) => {
                tracing::warn!(policy = %policy.name(), user = %user, resource_group = %resource_group, resource = %resource, error = %e, "error applying policy, denying");
                Decision::EvaluationFailed {
                    policy: policy.name().to_string(),
                    cause: e.to_string(),
                }
            }
            Ok(value) if value.truthy() => {
                tracing::debug!(policy = %policy.name(), user = %user, resource_group = %resource_group, resource = %resource, "allowed");
                Decision::Allowed {
                    policy: policy.name().to_string(),
                }
            }
            Ok(_) => {
                tracing::warn!(
                    policy = %policy.name(),
                    user = %user,
                    resource_group = %resource_group,
                    resource = %resource,
                    code = %policy.predicate().source(),
                    vars = %json!(vars),
                    "policy denied request"
                );
                Decision::Denied(DenyReason::PolicyRejected {
                    policy: policy.name().to_string(),
                })
            }
        }
    }

    /// Cached boolean decision, the entry point for `/auth` and the proxy.
    pub async fn evaluate_cached(&self, user: &str, resource_group: &str, resource: &str) -> bool {
        let key = DecisionKey::new(user, resource_group, resource);
        if let Some(allowed) = self.cache.get(&key) {
            self.metrics.decision_cache.inc(&[("result", "hit")]);
            return allowed;
        }
        self.metrics.decision_cache.inc(&[("result", "miss")]);

        let allowed = self.evaluate(user, resource_group, resource).await.is_allowed();
        self.cache.insert(key, allowed);
        allowed
    }
}
