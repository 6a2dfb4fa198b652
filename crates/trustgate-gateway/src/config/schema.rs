use serde::Deserialize;
use trustgate_core::error::{Result, TrustGateError};

fn invalid(msg: impl Into<String>) -> TrustGateError {
    TrustGateError::Config(msg.into())
}

fn in_range(name: &str, v: u64, range: std::ops::RangeInclusive<u64>) -> Result<()> {
    if range.contains(&v) {
        Ok(())
    } else {
        Err(invalid(format!(
            "{name} must be between {} and {}",
            range.start(),
            range.end()
        )))
    }
}

/// Top-level process config. Each optional section enables one role.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub scores: Option<ScoresSection>,

    #[serde(default)]
    pub decisions: Option<DecisionsSection>,

    #[serde(default)]
    pub proxy: Option<ProxySection>,

    #[serde(default)]
    pub script: ScriptSection,

    #[serde(default)]
    pub provider: Option<ProviderSection>,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(invalid(format!("unsupported config version {}", self.version)));
        }
        if self.scores.is_none()
            && self.decisions.is_none()
            && self.proxy.is_none()
            && self.provider.is_none()
        {
            return Err(invalid(
                "at least one of scores, decisions, proxy, provider must be configured",
            ));
        }

        self.gateway.validate()?;
        self.script.validate()?;

        if let Some(scores) = &self.scores {
            scores.validate()?;
        }
        if let Some(decisions) = &self.decisions {
            decisions.validate()?;
            if decisions.score_store.is_none() && self.scores.is_none() {
                return Err(invalid(
                    "decisions.score_store is required when this process has no scores section",
                ));
            }
        }
        if let Some(proxy) = &self.proxy {
            proxy.validate()?;
            if proxy.decision_point.is_none() && self.decisions.is_none() {
                return Err(invalid(
                    "proxy.decision_point is required when this process has no decisions section",
                ));
            }
        }
        if let Some(provider) = &self.provider {
            provider.validate()?;
            if provider.score_store.is_none() && self.scores.is_none() {
                return Err(invalid(
                    "provider.score_store is required when this process has no scores section",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        self.listen
            .parse::<std::net::SocketAddr>()
            .map(|_| ())
            .map_err(|e| invalid(format!("gateway.listen must be a socket address: {e}")))
    }
}

fn default_listen() -> String {
    "0.0.0.0:9990".into()
}

/// Trust Score Store role.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoresSection {
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_old_after_secs")]
    pub old_after_secs: u64,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for ScoresSection {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
            old_after_secs: default_old_after_secs(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl ScoresSection {
    pub fn validate(&self) -> Result<()> {
        in_range("scores.sweep_interval_ms", self.sweep_interval_ms, 100..=3_600_000)?;
        if self.old_after_secs == 0 {
            return Err(invalid("scores.old_after_secs must be positive"));
        }
        if self.stale_after_secs <= self.old_after_secs {
            return Err(invalid(
                "scores.stale_after_secs must be greater than old_after_secs",
            ));
        }
        Ok(())
    }
}

fn default_sweep_interval_ms() -> u64 {
    10_000
}
fn default_old_after_secs() -> u64 {
    3_600
}
fn default_stale_after_secs() -> u64 {
    7_200
}

/// Policy Decision Point role.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionsSection {
    pub policy_file: String,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    #[serde(default = "default_reload_poll_ms")]
    pub reload_poll_ms: u64,
    /// Remote score store base url; the local store is used when absent.
    #[serde(default)]
    pub score_store: Option<String>,
}

impl DecisionsSection {
    pub fn validate(&self) -> Result<()> {
        if self.policy_file.trim().is_empty() {
            return Err(invalid("decisions.policy_file must not be empty"));
        }
        in_range("decisions.cache_ttl_ms", self.cache_ttl_ms, 0..=3_600_000)?;
        in_range("decisions.reload_poll_ms", self.reload_poll_ms, 100..=600_000)?;
        if let Some(url) = &self.score_store {
            http_url("decisions.score_store", url)?;
        }
        Ok(())
    }
}

fn default_cache_ttl_ms() -> u64 {
    10_000
}
fn default_reload_poll_ms() -> u64 {
    1_000
}

/// Where the proxy sends the `#error` frame for a denied client frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenyReply {
    #[default]
    Upstream,
    Client,
}

/// Wire Enforcement Proxy role.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySection {
    pub upstream: String,
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
    #[serde(default)]
    pub deny_reply: DenyReply,
    /// Remote decision point base url; the local one is used when absent.
    #[serde(default)]
    pub decision_point: Option<String>,
}

impl ProxySection {
    pub fn validate(&self) -> Result<()> {
        if !(self.upstream.starts_with("ws://") || self.upstream.starts_with("wss://")) {
            return Err(invalid("proxy.upstream must be a ws:// or wss:// url"));
        }
        axum::http::HeaderName::from_bytes(self.identity_header.as_bytes())
            .map_err(|e| invalid(format!("proxy.identity_header is not a header name: {e}")))?;
        if let Some(url) = &self.decision_point {
            http_url("proxy.decision_point", url)?;
        }
        Ok(())
    }
}

fn default_identity_header() -> String {
    "x-goog-authenticated-user-id".into()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptSection {
    #[serde(default = "default_memory_limit_bytes")]
    pub memory_limit_bytes: usize,
    #[serde(default = "default_max_instructions")]
    pub max_instructions: u64,
}

impl Default for ScriptSection {
    fn default() -> Self {
        Self {
            memory_limit_bytes: default_memory_limit_bytes(),
            max_instructions: default_max_instructions(),
        }
    }
}

impl ScriptSection {
    pub fn validate(&self) -> Result<()> {
        if self.memory_limit_bytes != 0 && self.memory_limit_bytes < 256 * 1024 {
            return Err(invalid(
                "script.memory_limit_bytes must be 0 (unlimited) or at least 262144",
            ));
        }
        Ok(())
    }
}

fn default_memory_limit_bytes() -> usize {
    16 * 1024 * 1024
}
fn default_max_instructions() -> u64 {
    1_000_000
}

/// Bundled file-backed score provider.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSection {
    pub name: String,
    pub file: String,
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,
    #[serde(default)]
    pub score_store: Option<String>,
}

impl ProviderSection {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.name.contains(':') {
            return Err(invalid("provider.name must be non-empty and contain no ':'"));
        }
        if self.file.trim().is_empty() {
            return Err(invalid("provider.file must not be empty"));
        }
        in_range("provider.push_interval_ms", self.push_interval_ms, 1_000..=86_400_000)?;
        if let Some(url) = &self.score_store {
            http_url("provider.score_store", url)?;
        }
        Ok(())
    }
}

fn default_push_interval_ms() -> u64 {
    60_000
}

fn http_url(name: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be an http:// or https:// url")))
    }
}
