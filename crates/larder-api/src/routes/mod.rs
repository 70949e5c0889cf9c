//! API routes

mod categories;
mod health;
mod menus;
pub mod metrics;
mod restaurants;
mod tokens;
pub mod types;
mod users;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::Method,
    middleware::from_fn_with_state,
};
use larder_auth::{Validator, authenticate};
use larder_db::DbError;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::extract::MAX_BODY_BYTES;
use crate::middleware::{handle_panic, rate_limit};
use crate::state::{AppState, MetricsHandle};

/// Map a unique violation on `column` to `rejection`; other errors pass
/// through unchanged
pub(crate) fn on_duplicate(err: DbError, column: &str, rejection: ApiError) -> ApiError {
    if err.duplicate_field() == Some(column) {
        rejection
    } else {
        err.into()
    }
}

/// Required free-text field of `min..=max` characters
pub(crate) fn validate_text(v: &mut Validator, key: &str, value: &str, min: usize, max: usize) {
    v.check(!value.trim().is_empty(), key, "must be provided");
    let len = value.chars().count();
    v.check(
        (min..=max).contains(&len),
        key,
        &format!("must be between {} and {} characters long", min, max),
    );
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method.to_string())
}

/// Create the main router
///
/// Layers, outermost first: panic isolation, request tracing, rate limiting,
/// authentication. Per-route gates sit below routing.
pub fn create_router(state: AppState, metrics_handle: Option<Arc<MetricsHandle>>) -> Router {
    let mut router = Router::new()
        .merge(health::routes())
        .merge(users::routes())
        .merge(tokens::routes())
        .merge(restaurants::routes(&state))
        .merge(categories::routes(&state))
        .merge(menus::routes(&state))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state.clone());

    // Add metrics endpoint if handle is provided
    if let Some(handle) = metrics_handle {
        router = router.merge(metrics::routes(handle));
    }

    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn_with_state(state.sessions.clone(), authenticate))
        .layer(from_fn_with_state(state.limiter.clone(), rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
}
