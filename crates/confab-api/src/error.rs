//! API error type. Policy and validation failures carry a reason string
//! surfaced to the caller; storage failures are logged and masked.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use confab_db::DbError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("internal server error")]
    Internal,
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(reason) => ApiError::NotFound(reason),
            DbError::Validation(reason) => ApiError::Validation(reason),
            DbError::Storage(e) => {
                error!("Storage error: {}", e);
                ApiError::Internal
            }
            DbError::Fatal(reason) => {
                error!("Fatal storage state: {}", reason);
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "detail": self.to_string() }));

        if let ApiError::RateLimited { retry_after_secs } = self {
            return (
                status,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                body,
            )
                .into_response();
        }

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_errors_map_to_api_errors() {
        let err: ApiError = DbError::NotFound("message x".into()).into();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err: ApiError = DbError::Validation("bad parent".into()).into();
        assert!(matches!(err, ApiError::Validation(_)));

        // Storage details must not leak to the caller.
        let err: ApiError = DbError::Fatal("lock poisoned".into()).into();
        assert!(matches!(err, ApiError::Internal));
        assert_eq!(err.to_string(), "internal server error");
    }

    #[test]
    fn reason_strings_surface() {
        let err = ApiError::Forbidden("you are not a participant in this conversation".into());
        assert_eq!(
            err.to_string(),
            "you are not a participant in this conversation"
        );
    }
}
