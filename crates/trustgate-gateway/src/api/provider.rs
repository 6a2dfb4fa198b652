use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use trustgate_core::error::TrustGateError;
use trustgate_core::protocol::api::{ScoreAnswer, ScoreQuery};

use crate::app_state::AppState;

use super::error::ApiError;

/// `GET /provider/get`: raw lookup in the bundled provider's current feed.
pub async fn get(
    State(app): State<AppState>,
    body: std::result::Result<Json<ScoreQuery>, JsonRejection>,
) -> Result<Json<ScoreAnswer>, ApiError> {
    let Json(query) = body?;
    let provider = app
        .provider()
        .ok_or_else(|| ApiError(TrustGateError::NotAllowed("provider role disabled".into())))?;
    Ok(Json(provider.current().get(&query.user, &query.keys)))
}
