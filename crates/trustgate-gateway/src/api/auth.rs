//! Decision point endpoint: `POST /auth` answers 200 (allow) or 403 (deny)
//! with an empty body.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use trustgate_core::protocol::api::AuthRequest;

use crate::app_state::AppState;

pub async fn authorize(
    State(app): State<AppState>,
    body: std::result::Result<Json<AuthRequest>, JsonRejection>,
) -> StatusCode {
    let Some(decisions) = app.decisions() else {
        return StatusCode::FORBIDDEN;
    };
    let Ok(Json(req)) = body else {
        tracing::warn!("unreadable auth request denied");
        return StatusCode::FORBIDDEN;
    };

    if decisions
        .evaluate_cached(&req.user, &req.resource_group, &req.resource)
        .await
    {
        StatusCode::OK
    } else {
        StatusCode::FORBIDDEN
    }
}
