//! HTTP API bodies shared by the gateway handlers and their remote clients.
//!
//! Users and score keys are always strings; score values are always `f64`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Raw scores of one push: user -> key -> value.
pub type ScoresByUser = HashMap<String, HashMap<String, f64>>;

/// Normalization mapping: output key -> script text (optionally `##`+base64).
pub type NormalizationMapping = HashMap<String, String>;

/// `GET /get` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreQuery {
    pub user: String,
    pub keys: Vec<String>,
}

/// `GET /get` response: only keys that are known.
pub type ScoreAnswer = HashMap<String, f64>;

/// `GET /onramp` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnrampRequest {
    pub name: String,
    /// Url the store may contact for fresh scores (informational).
    #[serde(default)]
    pub pull: Option<String>,
}

/// `POST /update` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub name: String,
    pub scores: ScoresByUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<NormalizationMapping>,
}

/// `POST /auth` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub user: String,
    pub resource_group: String,
    pub resource: String,
}
