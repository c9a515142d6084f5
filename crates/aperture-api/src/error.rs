use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

/// Handler failure carrying the HTTP status and the `message` body the
/// client sees. Every user-facing refusal text lives at its call site.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(anyhow::Error::from(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, *m),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, *m),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, *m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, *m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, *m),
            ApiError::Internal(e) => {
                error!("internal error: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error.")
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}
