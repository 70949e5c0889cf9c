//! Request middleware: rate limiting and panic isolation

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header::CONNECTION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use larder_auth::error::SERVER_ERROR_MESSAGE;
use larder_limiter::RateLimiter;
use metrics::counter;
use serde_json::json;
use std::any::Any;
use std::net::SocketAddr;
use tracing::{error, warn};

use crate::error::ApiError;

/// Per-IP admission control. Runs before authentication so rejected clients
/// cost no token lookups.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = addr.ip();

    if !limiter.admit(ip).await? {
        counter!("larder_rate_limited_total").increment(1);
        warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
        return Err(ApiError::RateLimited);
    }

    Ok(next.run(request).await)
}

/// Turn a handler panic into an opaque 500 and close the connection
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };

    error!(panic_message = %detail, "Request handler panicked");

    let body = Json(json!({ "error": SERVER_ERROR_MESSAGE }));
    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router, body::Body, extract::connect_info::MockConnectInfo, middleware::from_fn_with_state,
        routing::get,
    };
    use std::time::Duration;
    use tower::ServiceExt;
    use tower_http::catch_panic::CatchPanicLayer;

    async fn boom() -> &'static str {
        panic!("handler blew up")
    }

    async fn ok() -> &'static str {
        "ok"
    }

    async fn get_status(app: &Router, uri: &str) -> StatusCode {
        let request = axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let app = Router::new()
            .route("/boom", get(boom))
            .route("/ok", get(ok))
            .layer(CatchPanicLayer::custom(handle_panic));

        let request = axum::http::Request::builder()
            .uri("/boom")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get(CONNECTION).unwrap(), "close");

        // The service keeps serving
        assert_eq!(get_status(&app, "/ok").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_and_recovers() {
        let app = Router::new()
            .route("/", get(ok))
            .layer(from_fn_with_state(RateLimiter::token_bucket(2, 4), rate_limit))
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 1], 9000))));

        let mut rejected = 0;
        for _ in 0..5 {
            if get_status(&app, "/").await == StatusCode::TOO_MANY_REQUESTS {
                rejected += 1;
            }
        }
        assert!(rejected >= 1);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(get_status(&app, "/").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_panic_response_is_opaque() {
        let response = handle_panic(Box::new("index out of bounds".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get(CONNECTION).unwrap(), "close");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": SERVER_ERROR_MESSAGE }));
    }

    #[test]
    fn test_non_string_payload() {
        let response = handle_panic(Box::new(42_u32));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
