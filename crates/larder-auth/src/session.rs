//! Cache-assisted session resolution
//!
//! Maps a presented bearer token to its user, consulting the key/value cache
//! before the database:
//!
//! - `token:<scope>:<hex digest>` holds the owning user id
//! - `user:<id>` holds a JSON snapshot of the user (no credential)
//!
//! The cache is never the source of truth. Every cache failure, timeout or
//! undecodable value degrades to a database lookup, and cache writes are
//! best-effort.
//!
//! Entries written after a database read are checked against the database
//! once more and dropped if the row changed or disappeared in the meantime.
//! Invalidation always runs after the database write it follows, so either
//! the re-check sees the change or the invalidation removes the entry.

use chrono::Utc;
use larder_db::{TokenScope, User};
use larder_kv::{KvStore, with_timeout};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::store::AccountStore;
use crate::tokens::{TokenManager, checked_hash};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Lifetime of cached user snapshots
    pub user_ttl: Duration,
    /// Deadline for each cache call; elapsing counts as a miss
    pub cache_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            user_ttl: Duration::from_secs(24 * 60 * 60),
            cache_timeout: Duration::from_millis(250),
        }
    }
}

fn token_key(scope: TokenScope, hash: &[u8]) -> String {
    format!("token:{}:{}", scope.as_str(), hex::encode(hash))
}

fn user_key(user_id: i64) -> String {
    format!("user:{}", user_id)
}

#[derive(Clone)]
pub struct SessionResolver {
    store: Arc<dyn AccountStore>,
    cache: Arc<dyn KvStore>,
    tokens: TokenManager,
    options: SessionOptions,
}

impl SessionResolver {
    pub fn new(
        store: Arc<dyn AccountStore>,
        cache: Arc<dyn KvStore>,
        options: SessionOptions,
    ) -> Self {
        Self {
            tokens: TokenManager::new(store.clone()),
            store,
            cache,
            options,
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Resolve a presented token to its user.
    ///
    /// Malformed tokens fail with `InvalidTokenFormat` before any lookup;
    /// unknown, expired or orphaned tokens fail with `InvalidToken`.
    pub async fn resolve(&self, plaintext: &str, scope: TokenScope) -> Result<User, AuthError> {
        let hash = checked_hash(plaintext)?;
        let key = token_key(scope, &hash);

        if let Some(user_id) = self.cached_token(&key).await {
            counter!("larder_auth_cache_hits_total").increment(1);
            if let Some(user) = self.cached_user(user_id).await {
                return Ok(user);
            }
            return self.load_user(user_id).await;
        }

        counter!("larder_auth_cache_misses_total").increment(1);
        let record = self.tokens.resolve_record(plaintext, scope).await?;
        let user = self.load_user(record.user_id).await?;

        let remaining = (record.expiry - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let ttl = remaining.min(self.options.user_ttl);
        if !ttl.is_zero() {
            self.cache_set(&key, &user.id.to_string(), ttl).await;
            // The row may have been revoked while this lookup was in flight
            if !self.token_still_stored(&hash, scope).await {
                debug!(user_id = user.id, "Token revoked during lookup, dropping cache entry");
                self.cache_delete(vec![key]).await;
            }
        }

        Ok(user)
    }

    /// Drop the cached snapshot of a user after it changed
    pub async fn invalidate_user(&self, user_id: i64) {
        self.cache_delete(vec![user_key(user_id)]).await;
    }

    /// Delete a user's tokens for `scope` along with their cache entries
    pub async fn revoke_all_for_user(
        &self,
        user_id: i64,
        scope: TokenScope,
    ) -> Result<u64, AuthError> {
        let hashes = self.store.token_hashes_for_user(user_id, scope).await?;
        let removed = self.tokens.revoke_all_for_user(user_id, scope).await?;

        let mut keys: Vec<String> = hashes.iter().map(|h| token_key(scope, h)).collect();
        keys.push(user_key(user_id));
        self.cache_delete(keys).await;

        Ok(removed)
    }

    async fn load_user(&self, user_id: i64) -> Result<User, AuthError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let snapshot = match serde_json::to_string(&user) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(user_id, "Failed to encode user snapshot: {}", e);
                return Ok(user);
            }
        };
        self.cache_set(&user_key(user_id), &snapshot, self.options.user_ttl)
            .await;

        // The snapshot stays only if the row still matches it after the write
        let current = self.store.get_user(user_id).await;
        let unchanged = matches!(
            &current,
            Ok(Some(row)) if serde_json::to_string(row).is_ok_and(|s| s == snapshot)
        );
        if !unchanged {
            debug!(user_id, "User changed during lookup, dropping snapshot");
            self.cache_delete(vec![user_key(user_id)]).await;
        }

        Ok(user)
    }

    async fn token_still_stored(&self, hash: &[u8], scope: TokenScope) -> bool {
        matches!(self.store.find_token(hash, scope).await, Ok(Some(_)))
    }

    async fn cached_token(&self, key: &str) -> Option<i64> {
        let value = self.cache_get(key).await?;
        match value.parse::<i64>() {
            Ok(user_id) => Some(user_id),
            Err(_) => {
                warn!(key, "Discarding undecodable cached token entry");
                None
            }
        }
    }

    async fn cached_user(&self, user_id: i64) -> Option<User> {
        let snapshot = self.cache_get(&user_key(user_id)).await?;
        match serde_json::from_str::<User>(&snapshot) {
            Ok(user) if user.id == user_id => Some(user),
            Ok(_) | Err(_) => {
                warn!(user_id, "Discarding undecodable cached user snapshot");
                None
            }
        }
    }

    async fn cache_get(&self, key: &str) -> Option<String> {
        match with_timeout(self.options.cache_timeout, self.cache.get(key)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, "Cache read failed, falling back to database: {}", e);
                None
            }
        }
    }

    async fn cache_set(&self, key: &str, value: &str, ttl: Duration) {
        if let Err(e) =
            with_timeout(self.options.cache_timeout, self.cache.set_ex(key, value, ttl)).await
        {
            warn!(key, "Cache write failed: {}", e);
        }
    }

    async fn cache_delete(&self, keys: Vec<String>) {
        match with_timeout(self.options.cache_timeout, self.cache.delete(&keys)).await {
            Ok(removed) => debug!(removed, "Invalidated cache entries"),
            Err(e) => warn!("Cache invalidation failed: {}", e),
        }
    }
}
