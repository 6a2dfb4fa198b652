//! Score store endpoints: `/get`, `/onramp`, `/update`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use trustgate_core::error::TrustGateError;
use trustgate_core::protocol::api::{OnrampRequest, ScoreAnswer, ScoreQuery, ScoreUpdate};

use crate::app_state::AppState;
use crate::scores::ScoreStore;

use super::error::ApiError;

type ApiResult<T> = std::result::Result<T, ApiError>;

fn local_store(app: &AppState) -> ApiResult<Arc<ScoreStore>> {
    app.store()
        .ok_or_else(|| ApiError(TrustGateError::NotAllowed("score store role disabled".into())))
}

pub async fn get_scores(
    State(app): State<AppState>,
    body: std::result::Result<Json<ScoreQuery>, JsonRejection>,
) -> ApiResult<Json<ScoreAnswer>> {
    let Json(query) = body?;
    let store = local_store(&app)?;
    let answer = store.get_scores(&query.user, &query.keys);
    tracing::debug!(user = %query.user, requested = query.keys.len(), found = answer.len(), "scores served");
    Ok(Json(answer))
}

pub async fn onramp(
    State(app): State<AppState>,
    body: std::result::Result<Json<OnrampRequest>, JsonRejection>,
) -> ApiResult<Json<bool>> {
    let Json(req) = body?;
    if req.name.is_empty() || req.name.contains(':') {
        return Err(TrustGateError::BadRequest("provider name must be non-empty and contain no ':'".into()).into());
    }
    local_store(&app)?.register_provider(&req.name, req.pull);
    Ok(Json(true))
}

pub async fn update(
    State(app): State<AppState>,
    body: std::result::Result<Json<ScoreUpdate>, JsonRejection>,
) -> ApiResult<Json<bool>> {
    let Json(update) = body?;
    if update.name.is_empty() || update.name.contains(':') {
        return Err(TrustGateError::BadRequest("provider name must be non-empty and contain no ':'".into()).into());
    }
    let store = local_store(&app)?;

    // normalization scripts block
    let provider = update.name.clone();
    tokio::task::spawn_blocking(move || {
        store.update_scores(&update.name, &update.scores, update.mapping.as_ref())
    })
    .await
    .map_err(|e| TrustGateError::Internal(format!("update task failed: {e}")))??;

    app.metrics()
        .score_updates
        .inc(&[("provider", provider.as_str())]);
    Ok(Json(true))
}
