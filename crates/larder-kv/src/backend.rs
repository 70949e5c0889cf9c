//! Key/value store trait

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::error::KvError;

/// Key/value store trait
///
/// The operations mirror the small command set a shared cache server offers:
/// plain string values with per-key expiry and an atomic counter.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Set a value that expires after `ttl`
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    /// Increment a counter and (re)arm its expiry in one step; returns the
    /// new count
    async fn incr_expire(&self, key: &str, ttl: Duration) -> Result<i64, KvError>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64, KvError>;
}

/// Run a store call under a deadline; elapsing maps to `KvError::Timeout`
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, KvError>
where
    F: Future<Output = Result<T, KvError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(KvError::Timeout),
    }
}
