//! Larder - Restaurant catalogue and account API server

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::{LogFormat, LoggingConfig, Overrides, Settings};
use larder_api::{AppState, LogMailer, create_router};
use larder_auth::spawn_token_reaper_task;
use larder_db::Database;
use larder_kv::{KvStore, MemoryStore, spawn_purge_task};
use larder_limiter::{RateLimiter, spawn_reaper_task};

/// Larder - Restaurant catalogue and account API server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "LARDER_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "LARDER_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(
        &args.config,
        &Overrides {
            bind: args.bind,
            port: args.port,
        },
    )?;

    init_logging(&settings.logging);

    info!("Starting Larder v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = if settings.metrics.enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install metrics recorder")?;
        info!("Prometheus metrics enabled at /metrics");
        Some(Arc::new(handle))
    } else {
        None
    };

    // Initialize database
    if let Some(dir) = database_dir(&settings.database.url) {
        tokio::fs::create_dir_all(dir).await?;
    }
    let db = Database::new(&settings.database.url, settings.database.options())
        .await
        .context("Failed to open database")?;

    // Shared key/value cache
    let cache = Arc::new(MemoryStore::new());
    let kv: Arc<dyn KvStore> = cache.clone();

    let limiter = RateLimiter::from_options(&settings.rate_limit.options()?, kv.clone());

    let state = AppState::new(
        db.clone(),
        kv,
        limiter.clone(),
        Arc::new(LogMailer),
        settings.auth.session_options(),
        settings.auth.settings(),
    );

    // Background housekeeping
    let reapers = [
        spawn_reaper_task(
            limiter,
            Duration::from_secs(settings.rate_limit.reap_interval_secs),
        ),
        spawn_purge_task(
            cache,
            Duration::from_secs(settings.cache.purge_interval_secs),
        ),
        spawn_token_reaper_task(
            state.sessions.tokens().clone(),
            Duration::from_secs(settings.auth.token_reap_interval_secs),
        ),
    ];

    let tasks = state.tasks.clone();
    let app = create_router(state, metrics_handle);

    let listener = tokio::net::TcpListener::bind((
        settings.server.bind_address.as_str(),
        settings.server.port,
    ))
    .await
    .with_context(|| {
        format!(
            "Failed to bind {}:{}",
            settings.server.bind_address, settings.server.port
        )
    })?;
    info!("Listening on {}", listener.local_addr()?);

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        }
    });

    tokio::select! {
        result = &mut server => {
            // The server stopped without being asked to
            result??;
        }
        _ = shutdown_signal() => {
            shutdown.cancel();

            let grace = Duration::from_secs(settings.server.shutdown_grace_secs);
            drain(&mut server, &tasks, Instant::now() + grace).await?;
        }
    }

    for reaper in reapers {
        reaper.abort();
    }
    db.close().await;

    info!("Server stopped");
    Ok(())
}

/// Wait for in-flight requests, then tracked background tasks, both bounded
/// by one shared deadline
async fn drain(
    server: &mut JoinHandle<std::io::Result<()>>,
    tasks: &TaskTracker,
    deadline: Instant,
) -> Result<()> {
    match tokio::time::timeout_at(deadline, &mut *server).await {
        Ok(result) => result??,
        Err(_) => {
            warn!("In-flight requests did not finish before the shutdown deadline");
            server.abort();
        }
    }

    tasks.close();
    if tokio::time::timeout_at(deadline, tasks.wait()).await.is_err() {
        warn!("{} background tasks abandoned at shutdown", tasks.len());
    }
    Ok(())
}

/// Parent directory of a file-backed SQLite URL
fn database_dir(url: &str) -> Option<&std::path::Path> {
    let path = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next()?;
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    std::path::Path::new(path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
}

/// Initialize logging
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_database_dir() {
        assert_eq!(database_dir("sqlite:./data/larder.db"), Some(Path::new("./data")));
        assert_eq!(
            database_dir("sqlite:///var/lib/larder/db.sqlite?mode=rwc"),
            Some(Path::new("/var/lib/larder"))
        );
        assert_eq!(database_dir("sqlite:larder.db"), None);
        assert_eq!(database_dir("sqlite::memory:"), None);
        assert_eq!(database_dir("postgres://localhost/larder"), None);
    }

    #[tokio::test]
    async fn test_drain_shares_one_deadline() {
        let mut server = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        });
        let tasks = TaskTracker::new();
        tasks.spawn(tokio::time::sleep(Duration::from_secs(10)));

        let started = Instant::now();
        drain(&mut server, &tasks, started + Duration::from_millis(300))
            .await
            .unwrap();

        // Background work only gets what the requests left of the deadline
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(450), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_drain_aborts_slow_server() {
        let mut server = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        });
        let tasks = TaskTracker::new();

        drain(&mut server, &tasks, Instant::now() + Duration::from_millis(50))
            .await
            .unwrap();
        assert!(tasks.is_closed());
    }
}
