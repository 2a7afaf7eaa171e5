use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use chess_replay_core::Error;

pub mod analysis;

pub async fn health() -> &'static str {
    "OK"
}

/// Errors reported by the JSON endpoints
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unavailable,
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        match error {
            Error::OrchestratorClosed => ApiError::Unavailable,
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "analysis is not running".to_string(),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
