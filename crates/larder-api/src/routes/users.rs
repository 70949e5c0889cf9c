//! Account routes: registration, activation and self-service profile

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    routing::{get, post, put},
};
use larder_auth::permissions::{RESTAURANT_READ, RESTAURANT_WRITE};
use larder_auth::validation::{validate_email, validate_name, validate_password_plaintext};
use larder_auth::{
    ActiveUser, AuthError, Credential, Validator, require_activated, validate_token_plaintext,
};
use larder_db::{NewUser, TokenScope, UpdateUser, User, UserRole};
use tracing::{error, info};

use crate::error::ApiError;
use crate::extract::{Id, JsonBody};
use crate::state::AppState;

use super::on_duplicate;
use super::types::{
    ActivateRequest, ChangePasswordRequest, MessageResponse, RegisterRequest, RegisteredResponse,
    UpdateUserRequest, UserResponse,
};

const DUPLICATE_EMAIL: &str = "a user with this email address already exists";

/// Only the account holder may act on their own record
fn ensure_self(caller: &User, id: i64) -> Result<(), ApiError> {
    if caller.id != id {
        return Err(AuthError::NotPermitted.into());
    }
    Ok(())
}

fn codes_for(role: UserRole) -> &'static [&'static str] {
    match role {
        UserRole::Customer => &[RESTAURANT_READ],
        UserRole::Seller => &[RESTAURANT_READ, RESTAURANT_WRITE],
    }
}

// ==================== Registration ====================

/// POST /v1/users
async fn register_customer(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisteredResponse>), ApiError> {
    register(state, input, UserRole::Customer).await
}

/// POST /v1/seller
async fn register_seller(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisteredResponse>), ApiError> {
    register(state, input, UserRole::Seller).await
}

async fn register(
    state: AppState,
    input: RegisterRequest,
    role: UserRole,
) -> Result<(StatusCode, Json<RegisteredResponse>), ApiError> {
    let mut v = Validator::new();
    validate_name(&mut v, "first_name", &input.first_name);
    validate_name(&mut v, "last_name", &input.last_name);
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, "password", &input.password);
    if !v.is_valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    let credential = Credential::set(&input.password)?;

    let user = state
        .db
        .insert_user(NewUser {
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            password_hash: credential.into_hash(),
            role,
        })
        .await
        .map_err(|e| on_duplicate(e, "email", ApiError::field("email", DUPLICATE_EMAIL)))?;

    state.permissions.grant(user.id, codes_for(role)).await?;

    let token = state
        .sessions
        .tokens()
        .issue(state.auth.activation_ttl, user.id, TokenScope::Activation)
        .await?;

    let mailer = state.mailer.clone();
    let (email, user_id) = (user.email.clone(), user.id);
    state.tasks.spawn(async move {
        if let Err(e) = mailer.send_activation(&email, user_id, &token.plaintext).await {
            error!(user_id, "Failed to send activation mail: {}", e);
        }
    });

    info!(user_id = user.id, role = role.as_str(), "Registered user");

    Ok((
        StatusCode::CREATED,
        Json(RegisteredResponse {
            user,
            message: "please check your email to activate your account",
        }),
    ))
}

/// PUT /v1/users/activated
async fn activate_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivateRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    if !v.is_valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    // The token row is deleted by the same statement that reads it, so a
    // token redeemed twice concurrently activates once.
    let user_id = match state
        .sessions
        .tokens()
        .consume(&input.token, TokenScope::Activation)
        .await
    {
        Ok(user_id) => user_id,
        Err(AuthError::InvalidToken) => {
            return Err(ApiError::field("token", "invalid or expired activation token"));
        }
        Err(e) => return Err(e.into()),
    };

    if !state.db.activate_user(user_id).await? {
        return Err(ApiError::NotFound);
    }
    state
        .sessions
        .revoke_all_for_user(user_id, TokenScope::Activation)
        .await?;

    let user = state
        .db
        .get_user_by_id(user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    info!(user_id, "Activated user");
    Ok(Json(UserResponse { user }))
}

// ==================== Profile ====================

/// GET /v1/users/{id}
async fn show_user(
    ActiveUser(caller): ActiveUser,
    State(state): State<AppState>,
    Id(id): Id,
) -> Result<Json<UserResponse>, ApiError> {
    ensure_self(&caller, id)?;

    let user = state
        .db
        .get_user_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(UserResponse { user }))
}

/// PATCH /v1/users/{id}
async fn update_user(
    ActiveUser(caller): ActiveUser,
    State(state): State<AppState>,
    Id(id): Id,
    JsonBody(input): JsonBody<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    ensure_self(&caller, id)?;

    let mut v = Validator::new();
    if let Some(first_name) = &input.first_name {
        validate_name(&mut v, "first_name", first_name);
    }
    if let Some(last_name) = &input.last_name {
        validate_name(&mut v, "last_name", last_name);
    }
    if let Some(email) = &input.email {
        validate_email(&mut v, email);
    }
    if !v.is_valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    let update = UpdateUser {
        first_name: input.first_name,
        last_name: input.last_name,
        email: input.email,
    };
    let updated = state
        .db
        .update_user(id, update)
        .await
        .map_err(|e| on_duplicate(e, "email", ApiError::field("email", DUPLICATE_EMAIL)))?;
    if !updated {
        return Err(ApiError::NotFound);
    }
    state.sessions.invalidate_user(id).await;

    let user = state
        .db
        .get_user_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    info!(user_id = id, "Updated user");
    Ok(Json(UserResponse { user }))
}

/// DELETE /v1/users/{id}
async fn delete_user(
    ActiveUser(caller): ActiveUser,
    State(state): State<AppState>,
    Id(id): Id,
) -> Result<Json<MessageResponse>, ApiError> {
    ensure_self(&caller, id)?;

    state
        .sessions
        .revoke_all_for_user(id, TokenScope::Authentication)
        .await?;
    if !state.db.delete_user(id).await? {
        return Err(ApiError::NotFound);
    }
    state.sessions.invalidate_user(id).await;

    info!(user_id = id, "Deleted user");
    Ok(Json(MessageResponse {
        message: "user successfully deleted",
    }))
}

/// PUT /v1/users/{id}/password
///
/// Every authentication token the user holds is revoked afterwards, the one
/// used for this request included.
async fn change_password(
    ActiveUser(caller): ActiveUser,
    State(state): State<AppState>,
    Id(id): Id,
    JsonBody(input): JsonBody<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    ensure_self(&caller, id)?;

    let hash = state
        .db
        .get_password_hash(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !Credential::from_hash(hash).verify(&input.old_password)? {
        return Err(ApiError::field(
            "old_password",
            "does not match the current password",
        ));
    }

    let mut v = Validator::new();
    validate_password_plaintext(&mut v, "new_password", &input.new_password);
    if !v.is_valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    let credential = Credential::set(&input.new_password)?;
    if !state.db.update_user_password(id, credential.hash()).await? {
        return Err(ApiError::NotFound);
    }
    state
        .sessions
        .revoke_all_for_user(id, TokenScope::Authentication)
        .await?;

    info!(user_id = id, "Changed password");
    Ok(Json(MessageResponse {
        message: "password successfully updated",
    }))
}

pub fn routes() -> Router<AppState> {
    let open = Router::new()
        .route("/v1/users", post(register_customer))
        .route("/v1/seller", post(register_seller))
        .route("/v1/users/activated", put(activate_user));

    let own = Router::new()
        .route(
            "/v1/users/{id}",
            get(show_user).patch(update_user).delete(delete_user),
        )
        .route("/v1/users/{id}/password", put(change_password))
        .route_layer(from_fn(require_activated));

    open.merge(own)
}
