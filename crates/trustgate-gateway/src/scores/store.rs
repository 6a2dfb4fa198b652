use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::{json, Map, Value};

use trustgate_core::error::{Result, TrustGateError};
use trustgate_core::protocol::api::{NormalizationMapping, ScoreAnswer, ScoresByUser};

use crate::script::{decode_script_text, CompiledScript, ScriptEnv, ScriptRuntime};

/// Global name of the user's raw score table inside normalization scripts.
pub const RAW_TABLE: &str = "raw";

/// Global name of the whole pushed batch (`user -> key -> value`).
pub const BATCH_TABLE: &str = "_score";

/// Compiled mapping scripts kept before the cache is reset.
const MAX_COMPILED_MAPPINGS: usize = 1024;

/// Age classes used by the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeThresholds {
    /// Entries at least this old are reported as aging (not acted upon).
    pub old: Duration,
    /// Entries at least this old are evicted.
    pub stale: Duration,
}

impl Default for AgeThresholds {
    fn default() -> Self {
        Self {
            old: Duration::from_secs(60 * 60),
            stale: Duration::from_secs(2 * 60 * 60),
        }
    }
}

/// One canonical score and the time it was last written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreEntry {
    pub value: f64,
    pub updated_at: Instant,
}

/// Address of one score.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScoreRef {
    pub provider: String,
    pub user: String,
    pub key: String,
}

/// Outcome of one sweep pass.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub evicted: usize,
    /// Old but not stale. Collected only; no refresh is requested yet.
    pub aging: Vec<ScoreRef>,
}

/// Outcome of one provider push.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSummary {
    pub users: usize,
    pub written: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct ProviderBook {
    pull_endpoint: Option<String>,
    users: HashMap<String, HashMap<String, ScoreEntry>>,
}

/// In-memory score aggregator.
pub struct ScoreStore {
    providers: DashMap<String, ProviderBook>,
    compiled: DashMap<String, CompiledScript>,
    runtime: ScriptRuntime,
    ages: AgeThresholds,
}

impl ScoreStore {
    pub fn new(runtime: ScriptRuntime, ages: AgeThresholds) -> Self {
        Self {
            providers: DashMap::new(),
            compiled: DashMap::new(),
            runtime,
            ages,
        }
    }

    pub fn ages(&self) -> AgeThresholds {
        self.ages
    }

    /// Idempotent upsert of provider metadata.
    pub fn register_provider(&self, name: &str, pull_endpoint: Option<String>) {
        let mut book = self.providers.entry(name.to_string()).or_default();
        if book.pull_endpoint != pull_endpoint {
            tracing::info!(provider = %name, pull = ?pull_endpoint, "provider registered");
        }
        book.pull_endpoint = pull_endpoint;
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn pull_endpoint(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|b| b.pull_endpoint.clone())
    }

    pub fn update_scores(
        &self,
        provider: &str,
        raw: &ScoresByUser,
        mapping: Option<&NormalizationMapping>,
    ) -> Result<UpdateSummary> {
        self.update_scores_at(provider, raw, mapping, Instant::now())
    }

    /// Merge a provider push into the store, stamping written keys with `now`.
    ///
    /// Mapping scripts are decoded and compiled before any state changes, so a
    /// bad mapping rejects the whole push. Per-user script failures only skip
    /// the affected key.
    pub fn update_scores_at(
        &self,
        provider: &str,
        raw: &ScoresByUser,
        mapping: Option<&NormalizationMapping>,
        now: Instant,
    ) -> Result<UpdateSummary> {
        let compiled = match mapping {
            Some(m) => Some(self.compile_mapping(provider, m)?),
            None => None,
        };

        let mut summary = UpdateSummary::default();
        let batch = match &compiled {
            Some(_) => json!(raw),
            None => Value::Null,
        };
        let mut canonical: Vec<(&String, HashMap<String, f64>)> = Vec::with_capacity(raw.len());
        for (user, user_scores) in raw {
            let scores = match &compiled {
                Some(scripts) => {
                    self.normalize(provider, user, user_scores, &batch, scripts, &mut summary)
                }
                None => user_scores.clone(),
            };
            canonical.push((user, scores));
        }

        if !self.providers.contains_key(provider) {
            tracing::info!(provider = %provider, "update from unknown provider, registering");
        }
        let mut book = self.providers.entry(provider.to_string()).or_default();
        for (user, scores) in canonical {
            summary.users += 1;
            summary.written += scores.len();
            let slot = book.users.entry(user.clone()).or_default();
            for (key, value) in scores {
                slot.insert(key, ScoreEntry { value, updated_at: now });
            }
        }

        tracing::debug!(provider = %provider, users = summary.users, written = summary.written, skipped = summary.skipped, "scores updated");
        Ok(summary)
    }

    fn compile_mapping(
        &self,
        provider: &str,
        mapping: &NormalizationMapping,
    ) -> Result<Vec<(String, CompiledScript)>> {
        if self.compiled.len() > MAX_COMPILED_MAPPINGS {
            self.compiled.clear();
        }

        let mut out = Vec::with_capacity(mapping.len());
        for (key, raw_text) in mapping {
            let text = decode_script_text(raw_text).map_err(|e| {
                TrustGateError::Script(format!("mapping {provider}:{key}: {e}"))
            })?;
            let name = format!("{provider}:{key}");
            let script = match self.compiled.get(&text) {
                Some(hit) => self.runtime.rename(hit.value(), &name),
                None => {
                    let script = self.runtime.compile(&name, &text)?;
                    self.compiled.insert(text, script.clone());
                    script
                }
            };
            out.push((key.clone(), script));
        }
        // Deterministic evaluation order.
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn normalize(
        &self,
        provider: &str,
        user: &str,
        user_scores: &HashMap<String, f64>,
        batch: &Value,
        scripts: &[(String, CompiledScript)],
        summary: &mut UpdateSummary,
    ) -> HashMap<String, f64> {
        let table: Map<String, Value> = user_scores
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        let mut env = ScriptEnv::new()
            .bind(BATCH_TABLE, batch.clone())
            .bind(RAW_TABLE, Value::Object(table));
        for (k, v) in user_scores {
            if !env.bind_untrusted(k, json!(v)) {
                tracing::debug!(provider = %provider, user = %user, var = %k, "raw key is not an identifier, not exposed");
            }
        }

        let mut out = HashMap::with_capacity(scripts.len());
        for (key, script) in scripts {
            let value = match self.runtime.execute(script, &env) {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(provider = %provider, user = %user, key = %key, error = %e, "mapping function failed");
                    summary.skipped += 1;
                    continue;
                }
            };
            if value.is_nil() {
                continue;
            }
            match value.to_f64() {
                Ok(f) => {
                    out.insert(key.clone(), f);
                }
                Err(e) => {
                    tracing::error!(provider = %provider, user = %user, key = %key, error = %e, "mapping must return nil or a float-convertible value");
                    summary.skipped += 1;
                }
            }
        }
        out
    }

    /// Requested `provider:key` scores that exist for `user`.
    pub fn get_scores(&self, user: &str, keys: &[String]) -> ScoreAnswer {
        let mut out = ScoreAnswer::with_capacity(keys.len());
        for qualified in keys {
            let Some((provider, key)) = qualified.split_once(':') else {
                continue;
            };
            let Some(book) = self.providers.get(provider) else {
                continue;
            };
            if let Some(entry) = book.users.get(user).and_then(|m| m.get(key)) {
                out.insert(qualified.clone(), entry.value);
            }
        }
        out
    }

    pub fn entry(&self, provider: &str, user: &str, key: &str) -> Option<ScoreEntry> {
        self.providers
            .get(provider)
            .and_then(|b| b.users.get(user).and_then(|m| m.get(key)).copied())
    }

    /// Number of stored scores across providers.
    pub fn len(&self) -> usize {
        self.providers
            .iter()
            .map(|b| b.users.values().map(HashMap::len).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    /// Evict stale entries, classifying every age against one `now`.
    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();
        let ages = self.ages;

        for mut book in self.providers.iter_mut() {
            let provider = book.key().clone();
            let book = book.value_mut();
            for (user, keys) in book.users.iter_mut() {
                keys.retain(|key, entry| {
                    let age = now.saturating_duration_since(entry.updated_at);
                    if age >= ages.stale {
                        tracing::debug!(provider = %provider, user = %user, key = %key, "stale score evicted");
                        report.evicted += 1;
                        return false;
                    }
                    if age >= ages.old {
                        report.aging.push(ScoreRef {
                            provider: provider.clone(),
                            user: user.clone(),
                            key: key.clone(),
                        });
                    }
                    true
                });
            }
            book.users.retain(|_, keys| !keys.is_empty());
        }

        report
    }
}
