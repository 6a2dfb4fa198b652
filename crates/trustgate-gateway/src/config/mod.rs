//! Gateway config loader (strict parsing).

pub mod schema;

use std::fs;

use trustgate_core::error::{Result, TrustGateError};

pub use schema::{
    DecisionsSection, DenyReply, GatewayConfig, GatewaySection, ProviderSection, ProxySection,
    ScoresSection, ScriptSection,
};

/// Env var naming the config file.
pub const CONFIG_ENV: &str = "TRUSTGATE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "trustgate.yaml";

pub fn config_path() -> String {
    std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

pub fn load_from_file(path: &str) -> Result<GatewayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| TrustGateError::Config(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| TrustGateError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
