//! Authentication error types

use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use larder_db::DbError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::validation::FieldErrors;

/// Message for failures whose detail must not reach the client
pub const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Malformed token")]
    InvalidTokenFormat(FieldErrors),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Activation required")]
    ActivationRequired,

    #[error("Not permitted")]
    NotPermitted,

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Entropy source failure: {0}")]
    Entropy(String),

    #[error("Store error: {0}")]
    Store(#[from] DbError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid authentication credentials")
            }
            AuthError::InvalidToken => {
                let body = axum::Json(json!({
                    "error": "invalid or missing authentication token"
                }));
                let mut response = (StatusCode::UNAUTHORIZED, body).into_response();
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            AuthError::InvalidTokenFormat(fields) => {
                let body = axum::Json(json!({ "error": fields }));
                return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
            }
            AuthError::AuthenticationRequired => (
                StatusCode::UNAUTHORIZED,
                "you must be authenticated to access this resource",
            ),
            AuthError::ActivationRequired => (
                StatusCode::UNAUTHORIZED,
                "your user account must be activated to access this resource",
            ),
            AuthError::NotPermitted => (
                StatusCode::UNAUTHORIZED,
                "your user account doesn't have the necessary permissions to access this resource",
            ),
            AuthError::PasswordHash(e) => {
                error!("Password hashing failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_MESSAGE)
            }
            AuthError::Entropy(e) => {
                error!("Token generation failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_MESSAGE)
            }
            AuthError::Store(e) => {
                error!("Store failure during authentication: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_MESSAGE)
            }
        };

        let body = axum::Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
