//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use larder_auth::error::SERVER_ERROR_MESSAGE;
use larder_auth::{AuthError, FieldErrors};
use larder_db::DbError;
use larder_limiter::LimiterError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

const NOT_FOUND_MESSAGE: &str = "the requested resource could not be found";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Rate limiter error: {0}")]
    Limiter(#[from] LimiterError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Validation failure on a single field
    pub fn field(key: &str, message: &str) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(key.to_string(), message.to_string());
        ApiError::Validation(fields)
    }
}

fn server_error(detail: &dyn std::fmt::Display) -> (StatusCode, serde_json::Value) {
    error!("{}", detail);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!(SERVER_ERROR_MESSAGE),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Auth(e) => return e.into_response(),
            ApiError::Validation(fields) => (StatusCode::UNPROCESSABLE_ENTITY, json!(fields)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!(msg)),
            ApiError::NotFound => (StatusCode::NOT_FOUND, json!(NOT_FOUND_MESSAGE)),
            ApiError::MethodNotAllowed(method) => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!(format!(
                    "the {} method is not supported for this resource",
                    method
                )),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, json!(msg)),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, json!("rate limit exceeded")),
            ApiError::Database(DbError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, json!(NOT_FOUND_MESSAGE))
            }
            ApiError::Database(DbError::Duplicate(msg)) => {
                (StatusCode::CONFLICT, json!(format!("duplicate entry: {}", msg)))
            }
            ApiError::Database(e) => server_error(&e),
            ApiError::Limiter(e) => server_error(&e),
            ApiError::Internal(msg) => server_error(&msg),
        };

        let body = axum::Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
