//! Configuration loading
//!
//! Settings are layered: built-in defaults, then the TOML file, then
//! `LARDER__SECTION__KEY` environment variables, then command line flags.

use anyhow::{Context, Result, bail};
use config::{Config, Environment, File, FileFormat, Source};
use larder_auth::SessionOptions;
use larder_db::DatabaseOptions;
use larder_limiter::{LimiterOptions, Strategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on cached user snapshot lifetime (30 days)
const MAX_USER_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Upper bound on token lifetimes (one year)
const MAX_TOKEN_TTL_HOURS: i64 = 365 * 24;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// How long in-flight requests and background work get after a
    /// shutdown signal
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 4000,
            shutdown_grace_secs: 30,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:./data/larder.db".to_string(),
            max_connections: 10,
            connect_timeout_secs: 5,
            query_timeout_secs: 3,
        }
    }
}

impl DatabaseConfig {
    pub fn options(&self) -> DatabaseOptions {
        DatabaseOptions {
            max_connections: self.max_connections,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            query_timeout: Duration::from_secs(self.query_timeout_secs),
        }
    }
}

/// Token lifetimes and session cache tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub activation_token_ttl_hours: i64,
    pub authentication_token_ttl_hours: i64,
    pub user_cache_ttl_secs: u64,
    pub cache_timeout_ms: u64,
    pub token_reap_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            activation_token_ttl_hours: 72,
            authentication_token_ttl_hours: 24,
            user_cache_ttl_secs: 24 * 60 * 60,
            cache_timeout_ms: 250,
            token_reap_interval_secs: 3600,
        }
    }
}

impl AuthConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            user_ttl: Duration::from_secs(self.user_cache_ttl_secs),
            cache_timeout: Duration::from_millis(self.cache_timeout_ms),
        }
    }

    pub fn settings(&self) -> larder_api::AuthSettings {
        larder_api::AuthSettings {
            activation_ttl: chrono::Duration::hours(self.activation_token_ttl_hours),
            authentication_ttl: chrono::Duration::hours(self.authentication_token_ttl_hours),
        }
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// `token_bucket` or `fixed_window`
    pub strategy: String,
    pub rps: u32,
    pub burst: u32,
    pub store_timeout_ms: u64,
    pub reap_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: Strategy::TokenBucket.to_string(),
            rps: 2,
            burst: 4,
            store_timeout_ms: 250,
            reap_interval_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn options(&self) -> Result<LimiterOptions> {
        let strategy = Strategy::from_str(&self.strategy).map_err(anyhow::Error::msg)?;
        Ok(LimiterOptions {
            enabled: self.enabled,
            strategy,
            rps: self.rps,
            burst: self.burst,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
        })
    }
}

/// Key/value cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub purge_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            purge_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

/// Values given on the command line; these win over every other layer
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

impl Settings {
    /// Load configuration, tolerating a missing file
    pub fn load(path: &str, overrides: &Overrides) -> Result<Self> {
        let file = File::new(path, FileFormat::Toml).required(false);
        Self::build(file, overrides)
            .with_context(|| format!("Failed to load configuration from {}", path))
    }

    fn build<S>(file: S, overrides: &Overrides) -> Result<Self>
    where
        S: Source + Send + Sync + 'static,
    {
        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("LARDER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.bind_address", overrides.bind.clone())?
            .set_override_option("server.port", overrides.port.map(i64::from))?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.rate_limit.enabled && (self.rate_limit.rps == 0 || self.rate_limit.burst == 0) {
            bail!("rate_limit.rps and rate_limit.burst must be at least 1");
        }
        for (key, hours) in [
            ("auth.activation_token_ttl_hours", self.auth.activation_token_ttl_hours),
            ("auth.authentication_token_ttl_hours", self.auth.authentication_token_ttl_hours),
        ] {
            if !(1..=MAX_TOKEN_TTL_HOURS).contains(&hours) {
                bail!("{} must be between 1 and {}", key, MAX_TOKEN_TTL_HOURS);
            }
        }
        let intervals = [
            ("rate_limit.reap_interval_secs", self.rate_limit.reap_interval_secs),
            ("cache.purge_interval_secs", self.cache.purge_interval_secs),
            ("auth.token_reap_interval_secs", self.auth.token_reap_interval_secs),
        ];
        for (key, secs) in intervals {
            if secs == 0 {
                bail!("{} must be at least 1", key);
            }
        }
        if !(1..=MAX_USER_CACHE_TTL_SECS).contains(&self.auth.user_cache_ttl_secs) {
            bail!(
                "auth.user_cache_ttl_secs must be between 1 and {}",
                MAX_USER_CACHE_TTL_SECS
            );
        }
        self.rate_limit.options()?;
        Ok(())
    }
}
