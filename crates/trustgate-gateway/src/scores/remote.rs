//! HTTP client for a score store running in another process.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use trustgate_core::error::{Result, TrustGateError};
use trustgate_core::protocol::api::{OnrampRequest, ScoreAnswer, ScoreQuery, ScoreUpdate};

use super::source::{ScoreSink, ScoreSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct HttpScoreClient {
    base: String,
    http: reqwest::Client,
}

impl HttpScoreClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TrustGateError::Internal(format!("http client build failed: {e}")))?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

fn unavailable(what: &str, e: reqwest::Error) -> TrustGateError {
    TrustGateError::Unavailable(format!("score store {what}: {e}"))
}

#[async_trait]
impl ScoreSource for HttpScoreClient {
    async fn get_scores(&self, user: &str, keys: &[String]) -> Result<ScoreAnswer> {
        let query = ScoreQuery {
            user: user.to_string(),
            keys: keys.to_vec(),
        };
        let resp = self
            .http
            .get(self.url("/get"))
            .json(&query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable("get", e))?;
        // older stores answer unknown keys with null
        let body: HashMap<String, Option<f64>> =
            resp.json().await.map_err(|e| unavailable("get body", e))?;
        Ok(body
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }
}

#[async_trait]
impl ScoreSink for HttpScoreClient {
    async fn onramp(&self, name: &str, pull: Option<&str>) -> Result<()> {
        let req = OnrampRequest {
            name: name.to_string(),
            pull: pull.map(str::to_string),
        };
        self.http
            .get(self.url("/onramp"))
            .json(&req)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable("onramp", e))?;
        Ok(())
    }

    async fn push(&self, update: &ScoreUpdate) -> Result<()> {
        self.http
            .post(self.url("/update"))
            .json(update)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable("update", e))?;
        Ok(())
    }
}
