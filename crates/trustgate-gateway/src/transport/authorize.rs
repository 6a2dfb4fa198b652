//! Who the proxy asks before forwarding a frame.

use std::time::Duration;

use async_trait::async_trait;

use trustgate_core::error::{Result, TrustGateError};
use trustgate_core::protocol::api::AuthRequest;

use crate::policy::DecisionPoint;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Boolean authorization. Implementations must answer `false` on any error.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, user: &str, resource_group: &str, resource: &str) -> bool;
}

#[async_trait]
impl Authorizer for DecisionPoint {
    async fn authorize(&self, user: &str, resource_group: &str, resource: &str) -> bool {
        self.evaluate_cached(user, resource_group, resource).await
    }
}

/// Decision point reached over `POST /auth`.
#[derive(Debug, Clone)]
pub struct HttpAuthorizer {
    url: String,
    http: reqwest::Client,
}

impl HttpAuthorizer {
    pub fn new(base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TrustGateError::Internal(format!("http client build failed: {e}")))?;
        Ok(Self {
            url: format!("{}/auth", base.trim_end_matches('/')),
            http,
        })
    }
}

#[async_trait]
impl Authorizer for HttpAuthorizer {
    async fn authorize(&self, user: &str, resource_group: &str, resource: &str) -> bool {
        let req = AuthRequest {
            user: user.to_string(),
            resource_group: resource_group.to_string(),
            resource: resource.to_string(),
        };
        match self.http.post(&self.url).json(&req).send().await {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::warn!(user = %user, resource_group = %resource_group, resource = %resource, error = %e, "decision point unreachable, denying");
                false
            }
        }
    }
}
