//! Authentication token issuance

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use larder_auth::validation::{validate_email, validate_password_plaintext};
use larder_auth::{AuthError, Credential, Validator};
use larder_db::TokenScope;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;

use super::types::{LoginRequest, TokenResponse};

/// POST /v1/tokens/authentication
///
/// Unknown email and wrong password are indistinguishable to the client,
/// both in the response and in the time taken.
async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<LoginRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, "password", &input.password);
    if !v.is_valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    let Some((user, hash)) = state.db.get_credentials_by_email(&input.email).await? else {
        Credential::verify_dummy(&input.password);
        debug!("Login attempt for unknown email");
        return Err(AuthError::InvalidCredentials.into());
    };

    if !Credential::from_hash(hash).verify(&input.password)? {
        debug!(user_id = user.id, "Login attempt with wrong password");
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = state
        .sessions
        .tokens()
        .issue(
            state.auth.authentication_ttl,
            user.id,
            TokenScope::Authentication,
        )
        .await?;

    info!(user_id = user.id, "Issued authentication token");
    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            authentication_token: token,
        }),
    ))
}

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/v1/tokens/authentication",
        post(create_authentication_token),
    )
}
