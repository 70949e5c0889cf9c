//! Application state

use chrono::Duration;
use larder_auth::{AccountStore, PermissionStore, SessionOptions, SessionResolver};
use larder_db::Database;
use larder_kv::KvStore;
use larder_limiter::RateLimiter;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio_util::task::TaskTracker;

use crate::mailer::Mailer;

/// Handle used to render the Prometheus exposition
pub type MetricsHandle = PrometheusHandle;

/// Token lifetimes handed out by the account routes
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub activation_ttl: Duration,
    pub authentication_ttl: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            activation_ttl: Duration::hours(72),
            authentication_ttl: Duration::hours(24),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub sessions: SessionResolver,
    pub permissions: PermissionStore,
    pub limiter: RateLimiter,
    pub mailer: Arc<dyn Mailer>,
    /// Background work spawned by handlers; drained on shutdown
    pub tasks: TaskTracker,
    pub auth: AuthSettings,
}

impl AppState {
    pub fn new(
        db: Database,
        cache: Arc<dyn KvStore>,
        limiter: RateLimiter,
        mailer: Arc<dyn Mailer>,
        session_options: SessionOptions,
        auth: AuthSettings,
    ) -> Self {
        let store: Arc<dyn AccountStore> = Arc::new(db.clone());

        Self {
            sessions: SessionResolver::new(store.clone(), cache, session_options),
            permissions: PermissionStore::new(store),
            db,
            limiter,
            mailer,
            tasks: TaskTracker::new(),
            auth,
        }
    }
}
