//! Authorization middleware for Axum
//!
//! `authenticate` runs on every request and records a [`CallerIdentity`].
//! The gates run as route layers, each one including the checks of the one
//! before it:
//!
//! `require_authenticated` < `require_activated` < `require_permission`

use axum::{
    extract::{Request, State},
    http::{
        HeaderMap, HeaderValue,
        header::{AUTHORIZATION, VARY},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use larder_db::{TokenScope, User};
use tracing::debug;

use crate::error::AuthError;
use crate::identity::{Caller, CallerIdentity};
use crate::permissions::PermissionStore;
use crate::session::SessionResolver;

/// Split `Bearer <token>`; anything else is an invalid token
fn extract_bearer_token(header: &str) -> Result<&str, AuthError> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(AuthError::InvalidToken),
    }
}

async fn identify(
    sessions: &SessionResolver,
    headers: &HeaderMap,
) -> Result<CallerIdentity, AuthError> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(CallerIdentity::Anonymous);
    };

    let header = header.to_str().map_err(|_| AuthError::InvalidToken)?;
    let token = extract_bearer_token(header)?;
    let user = sessions.resolve(token, TokenScope::Authentication).await?;

    debug!(user_id = user.id, "Authenticated request");
    Ok(CallerIdentity::User(user))
}

/// Authentication middleware
///
/// A request without an `Authorization` header proceeds as anonymous. A
/// header that is present but cannot be resolved ends the request here.
pub async fn authenticate(
    State(sessions): State<SessionResolver>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = identify(&sessions, request.headers()).await;
    let mut response = match identity {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    };

    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    response
}

fn authenticated(identity: &CallerIdentity) -> Result<&User, AuthError> {
    identity.user().ok_or(AuthError::AuthenticationRequired)
}

fn activated(identity: &CallerIdentity) -> Result<&User, AuthError> {
    let user = authenticated(identity)?;
    if !user.is_active {
        return Err(AuthError::ActivationRequired);
    }
    Ok(user)
}

/// Middleware to require a non-anonymous caller
pub async fn require_authenticated(
    Caller(identity): Caller,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    authenticated(&identity)?;
    Ok(next.run(request).await)
}

/// Middleware to require an activated account
pub async fn require_activated(
    Caller(identity): Caller,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    activated(&identity)?;
    Ok(next.run(request).await)
}

/// State for [`require_permission`]: the code a route demands
#[derive(Clone)]
pub struct PermissionGate {
    permissions: PermissionStore,
    code: &'static str,
}

impl PermissionGate {
    pub fn new(permissions: PermissionStore, code: &'static str) -> Self {
        Self { permissions, code }
    }
}

/// Middleware to require an activated account holding the gate's code
pub async fn require_permission(
    State(gate): State<PermissionGate>,
    Caller(identity): Caller,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = activated(&identity)?;

    let permissions = gate.permissions.get_all(user.id).await?;
    if !permissions.include(gate.code) {
        debug!(user_id = user.id, code = gate.code, "Permission denied");
        return Err(AuthError::NotPermitted);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{RESTAURANT_READ, RESTAURANT_WRITE};
    use crate::session::SessionOptions;
    use crate::store::testing::database_with_user;
    use crate::tokens::generate_token;
    use axum::{
        Router,
        body::Body,
        http::{StatusCode, header::WWW_AUTHENTICATE},
        middleware::{from_fn, from_fn_with_state},
        routing::get,
    };
    use chrono::Duration;
    use larder_db::Database;
    use larder_kv::MemoryStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn whoami(Caller(identity): Caller) -> String {
        match identity {
            CallerIdentity::Anonymous => "anonymous".to_string(),
            CallerIdentity::User(user) => format!("user:{}", user.id),
        }
    }

    fn app(db: Database) -> Router {
        let store = Arc::new(db);
        let sessions = SessionResolver::new(
            store.clone(),
            Arc::new(MemoryStore::new()),
            SessionOptions::default(),
        );
        let permissions = PermissionStore::new(store);

        Router::new()
            .route(
                "/read",
                get(whoami).route_layer(from_fn_with_state(
                    PermissionGate::new(permissions.clone(), RESTAURANT_READ),
                    require_permission,
                )),
            )
            .route(
                "/write",
                get(whoami).route_layer(from_fn_with_state(
                    PermissionGate::new(permissions, RESTAURANT_WRITE),
                    require_permission,
                )),
            )
            .route("/active", get(whoami).route_layer(from_fn(require_activated)))
            .route("/me", get(whoami).route_layer(from_fn(require_authenticated)))
            .route("/open", get(whoami))
            .layer(from_fn_with_state(sessions, authenticate))
    }

    async fn call(app: &Router, uri: &str, auth: Option<&str>) -> Response {
        let mut request = axum::http::Request::builder().uri(uri);
        if let Some(value) = auth {
            request = request.header(AUTHORIZATION, value);
        }
        app.clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_passes_ungated_route() {
        let (db, _) = database_with_user("m1@example.com").await;
        let app = app(db);

        let response = call(&app, "/open", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(VARY).unwrap(), "Authorization");
        assert_eq!(body_text(response).await, "anonymous");

        let response = call(&app, "/me", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
        assert!(body_text(response).await.contains("must be authenticated"));
    }

    #[tokio::test]
    async fn test_malformed_header_is_invalid_token() {
        let (db, _) = database_with_user("m2@example.com").await;
        let app = app(db);

        for header in ["Token abc", "Bearer", "Bearer a b", "bearer abc"] {
            let response = call(&app, "/open", Some(header)).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{header}");
            assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");
            assert_eq!(response.headers().get(VARY).unwrap(), "Authorization");
        }
    }

    #[tokio::test]
    async fn test_malformed_token_is_validation_error() {
        let (db, _) = database_with_user("m3@example.com").await;
        let app = app(db);

        let response = call(&app, "/open", Some("Bearer short")).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_text(response).await.contains("must be 22 characters long"));
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let (db, user) = database_with_user("m4@example.com").await;
        let app = app(db);
        let stranger =
            generate_token(Duration::hours(1), user.id, TokenScope::Authentication).unwrap();

        let header = format!("Bearer {}", stranger.plaintext);
        let response = call(&app, "/open", Some(&header)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");
    }

    #[tokio::test]
    async fn test_gates_in_order() {
        let (db, user) = database_with_user("m5@example.com").await;
        let token = crate::tokens::TokenManager::new(Arc::new(db.clone()))
            .issue(Duration::hours(1), user.id, TokenScope::Authentication)
            .await
            .unwrap();
        let header = format!("Bearer {}", token.plaintext);
        let app = app(db.clone());

        let response = call(&app, "/me", Some(&header)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, format!("user:{}", user.id));

        // Not activated yet
        let response = call(&app, "/active", Some(&header)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("must be activated"));
        let response = call(&app, "/read", Some(&header)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("must be activated"));
    }

    #[tokio::test]
    async fn test_permission_gate() {
        let (db, user) = database_with_user("m6@example.com").await;
        db.activate_user(user.id).await.unwrap();
        db.grant_permissions(user.id, &[RESTAURANT_READ]).await.unwrap();
        let token = crate::tokens::TokenManager::new(Arc::new(db.clone()))
            .issue(Duration::hours(1), user.id, TokenScope::Authentication)
            .await
            .unwrap();
        let header = format!("Bearer {}", token.plaintext);
        let app = app(db);

        let response = call(&app, "/read", Some(&header)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = call(&app, "/write", Some(&header)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("necessary permissions"));

        let response = call(&app, "/read", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
