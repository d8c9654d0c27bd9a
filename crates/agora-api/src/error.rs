//! Request-level error taxonomy for the HTTP surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use agora_db::queries::VoteError;

/// Every variant maps to a stable status code and a JSON `{"error": ...}`
/// body. Store failures are logged and reported generically so persistence
/// details never reach the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("{0}")]
    RateLimited(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Internal(err) => {
                error!("internal error: {err:#}");
                "something went wrong".to_string()
            }
            other => other.to_string(),
        };

        (self.status(), Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<VoteError> for ApiError {
    fn from(err: VoteError) -> Self {
        match err {
            VoteError::NotFound => ApiError::NotFound("proposal"),
            VoteError::MinisterOnly => ApiError::Forbidden("minister access required"),
            VoteError::Closed => ApiError::Conflict("voting is already closed"),
            VoteError::AlreadyVoted => ApiError::Conflict("you have already voted"),
            VoteError::Store(err) => ApiError::Internal(err),
        }
    }
}
