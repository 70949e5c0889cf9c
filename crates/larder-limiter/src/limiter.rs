//! Rate limiter implementation

use chrono::Utc;
use governor::{DefaultKeyedRateLimiter, Quota};
use larder_kv::{KvStore, with_timeout};
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::LimiterError;

/// Lifetime of a fixed-window counter; comfortably outlives its second
const WINDOW_TTL: Duration = Duration::from_secs(5);

/// How clients are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// In-process token bucket per client IP
    #[default]
    TokenBucket,
    /// Shared per-second counter in the key/value store
    FixedWindow,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::TokenBucket => "token_bucket",
            Strategy::FixedWindow => "fixed_window",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "token_bucket" => Ok(Strategy::TokenBucket),
            "fixed_window" => Ok(Strategy::FixedWindow),
            other => Err(format!("unknown rate limit strategy: {}", other)),
        }
    }
}

/// Configuration for the rate limiter
#[derive(Debug, Clone)]
pub struct LimiterOptions {
    pub enabled: bool,
    pub strategy: Strategy,
    /// Sustained requests per second per client
    pub rps: u32,
    /// Token bucket capacity; unused by the fixed window
    pub burst: u32,
    /// Deadline for each store call (fixed window only)
    pub store_timeout: Duration,
}

impl Default for LimiterOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: Strategy::TokenBucket,
            rps: 2,
            burst: 4,
            store_timeout: Duration::from_millis(250),
        }
    }
}

#[derive(Clone)]
enum Backend {
    Disabled,
    TokenBucket(Arc<DefaultKeyedRateLimiter<IpAddr>>),
    FixedWindow {
        store: Arc<dyn KvStore>,
        rps: i64,
        timeout: Duration,
    },
}

/// Per-client admission control
#[derive(Clone)]
pub struct RateLimiter {
    backend: Backend,
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

impl RateLimiter {
    /// Admit everything
    pub fn disabled() -> Self {
        Self {
            backend: Backend::Disabled,
        }
    }

    /// Token bucket refilling at `rps` per second, holding at most `burst`
    pub fn token_bucket(rps: u32, burst: u32) -> Self {
        let quota = Quota::per_second(non_zero(rps)).allow_burst(non_zero(burst));
        Self {
            backend: Backend::TokenBucket(Arc::new(governor::RateLimiter::keyed(quota))),
        }
    }

    /// At most `rps` requests per client per wall-clock second, counted in
    /// `store`
    pub fn fixed_window(store: Arc<dyn KvStore>, rps: u32, timeout: Duration) -> Self {
        Self {
            backend: Backend::FixedWindow {
                store,
                rps: i64::from(rps),
                timeout,
            },
        }
    }

    pub fn from_options(options: &LimiterOptions, store: Arc<dyn KvStore>) -> Self {
        if !options.enabled {
            info!("Rate limiting disabled");
            return Self::disabled();
        }

        info!(
            "Rate limiting enabled (strategy: {}, rps: {}, burst: {})",
            options.strategy, options.rps, options.burst
        );
        match options.strategy {
            Strategy::TokenBucket => Self::token_bucket(options.rps, options.burst),
            Strategy::FixedWindow => {
                Self::fixed_window(store, options.rps, options.store_timeout)
            }
        }
    }

    /// Decide whether a request from `client` may proceed. `Ok(false)` means
    /// over the limit; an error means the decision could not be made.
    pub async fn admit(&self, client: IpAddr) -> Result<bool, LimiterError> {
        match &self.backend {
            Backend::Disabled => Ok(true),
            Backend::TokenBucket(limiter) => Ok(limiter.check_key(&client).is_ok()),
            Backend::FixedWindow {
                store,
                rps,
                timeout,
            } => {
                let key = format!("rate_limit:{}:{}", client, Utc::now().timestamp());
                let count = with_timeout(*timeout, store.incr_expire(&key, WINDOW_TTL)).await?;
                Ok(count <= *rps)
            }
        }
    }

    /// Forget token buckets that have refilled completely; returns the number
    /// of clients still tracked
    pub fn reap(&self) -> usize {
        match &self.backend {
            Backend::TokenBucket(limiter) => {
                limiter.retain_recent();
                limiter.shrink_to_fit();
                limiter.len()
            }
            Backend::Disabled | Backend::FixedWindow { .. } => 0,
        }
    }

    /// Number of clients with live token bucket state
    pub fn tracked_clients(&self) -> usize {
        match &self.backend {
            Backend::TokenBucket(limiter) => limiter.len(),
            Backend::Disabled | Backend::FixedWindow { .. } => 0,
        }
    }
}

/// Spawn a background task that periodically drops idle client buckets
pub fn spawn_reaper_task(limiter: RateLimiter, interval: Duration) -> tokio::task::JoinHandle<()> {
    info!(
        "Starting background rate limiter reaper task (interval: {} seconds)",
        interval.as_secs()
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        // Skip the first tick (which fires immediately)
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let remaining = limiter.reap();
            debug!(remaining, "Reaped idle rate limiter buckets");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use larder_kv::{KvError, MemoryStore};
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    struct DownStore;

    #[async_trait]
    impl KvStore for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
            Err(KvError::Backend("down".to_string()))
        }
        async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), KvError> {
            Err(KvError::Backend("down".to_string()))
        }
        async fn incr_expire(&self, _key: &str, _ttl: Duration) -> Result<i64, KvError> {
            Err(KvError::Backend("down".to_string()))
        }
        async fn delete(&self, _keys: &[String]) -> Result<u64, KvError> {
            Err(KvError::Backend("down".to_string()))
        }
    }

    async fn admitted(limiter: &RateLimiter, client: IpAddr, n: usize) -> usize {
        let mut count = 0;
        for _ in 0..n {
            if limiter.admit(client).await.unwrap() {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn test_token_bucket_rejects_burst_overflow() {
        let limiter = RateLimiter::token_bucket(2, 4);

        let ok = admitted(&limiter, ip(1), 5).await;
        assert!(ok < 5, "at least one of five rapid requests is rejected");
        assert_eq!(ok, 4);

        // Another client has its own bucket
        assert!(limiter.admit(ip(2)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.admit(ip(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_fixed_window_counts_per_second() {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::fixed_window(store, 2, Duration::from_millis(250));

        let ok = admitted(&limiter, ip(3), 5).await;
        assert!(ok < 5);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.admit(ip(3)).await.unwrap());
    }

    #[tokio::test]
    async fn test_fixed_window_store_failure_is_error() {
        let limiter = RateLimiter::fixed_window(Arc::new(DownStore), 2, Duration::from_millis(250));
        let err = limiter.admit(ip(4)).await.unwrap_err();
        assert!(matches!(err, LimiterError::Store(_)));
    }

    #[tokio::test]
    async fn test_disabled_admits_everything() {
        let options = LimiterOptions {
            enabled: false,
            ..Default::default()
        };
        let limiter = RateLimiter::from_options(&options, Arc::new(MemoryStore::new()));
        assert_eq!(admitted(&limiter, ip(5), 50).await, 50);
    }

    #[tokio::test]
    async fn test_reap_drops_refilled_buckets() {
        let limiter = RateLimiter::token_bucket(50, 1);
        limiter.admit(ip(6)).await.unwrap();
        limiter.admit(ip(7)).await.unwrap();
        assert_eq!(limiter.tracked_clients(), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(limiter.reap(), 0);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("token_bucket".parse::<Strategy>().unwrap(), Strategy::TokenBucket);
        assert_eq!("fixed_window".parse::<Strategy>().unwrap(), Strategy::FixedWindow);
        assert!("leaky".parse::<Strategy>().is_err());
        assert_eq!(Strategy::default(), Strategy::TokenBucket);
    }
}
