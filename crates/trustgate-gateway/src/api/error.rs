use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use trustgate_core::error::{ClientCode, TrustGateError};

/// Handler error rendered as `{error, message}`.
#[derive(Debug)]
pub struct ApiError(pub TrustGateError);

impl From<TrustGateError> for ApiError {
    fn from(e: TrustGateError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self(TrustGateError::BadRequest(e.body_text()))
    }
}

fn status_of(code: ClientCode) -> StatusCode {
    match code {
        ClientCode::BadRequest | ClientCode::Malformed | ClientCode::Script => {
            StatusCode::BAD_REQUEST
        }
        ClientCode::Config => StatusCode::UNPROCESSABLE_ENTITY,
        ClientCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ClientCode::IdentityMissing | ClientCode::Forbidden => StatusCode::FORBIDDEN,
        ClientCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.client_code();
        let body = json!({ "error": code.as_str(), "message": self.0.to_string() });
        (status_of(code), Json(body)).into_response()
    }
}
