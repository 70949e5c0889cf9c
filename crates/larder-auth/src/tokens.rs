//! Opaque bearer tokens
//!
//! A token is 16 random bytes rendered as unpadded URL-safe base64. Only the
//! SHA-256 digest of that text is ever persisted.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use larder_db::{TokenRecord, TokenScope};
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::AuthError;
use crate::store::AccountStore;
use crate::validation::Validator;

/// Random bytes per token
pub const TOKEN_BYTES: usize = 16;

/// Encoded plaintext length
pub const TOKEN_LENGTH: usize = 22;

/// A freshly minted token. The plaintext exists only here and in the response
/// that hands it to the client.
#[derive(Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: Vec<u8>,
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: TokenScope,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"[redacted]")
            .field("hash", &hex::encode(&self.hash))
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

impl Token {
    fn record(&self) -> TokenRecord {
        TokenRecord {
            hash: self.hash.clone(),
            user_id: self.user_id,
            expiry: self.expiry,
            scope: self.scope,
        }
    }
}

/// SHA-256 digest of a token's plaintext
pub fn hash_token(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

/// Mint a token for `user_id` valid for `ttl`
pub fn generate_token(ttl: Duration, user_id: i64, scope: TokenScope) -> Result<Token, AuthError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::Entropy(e.to_string()))?;

    let plaintext = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_token(&plaintext);

    Ok(Token {
        plaintext,
        hash,
        user_id,
        expiry: Utc::now() + ttl,
        scope,
    })
}

/// Check the shape of a presented token before touching any store
pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == TOKEN_LENGTH,
        "token",
        "must be 22 characters long",
    );
    v.check(
        URL_SAFE_NO_PAD.decode(plaintext).is_ok(),
        "token",
        "must be URL-safe base64",
    );
}

pub(crate) fn checked_hash(plaintext: &str) -> Result<Vec<u8>, AuthError> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, plaintext);
    if !v.is_valid() {
        return Err(AuthError::InvalidTokenFormat(v.into_errors()));
    }
    Ok(hash_token(plaintext))
}

/// Issues, resolves and revokes tokens against the account store
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn AccountStore>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Generate a token and persist its digest
    pub async fn issue(
        &self,
        ttl: Duration,
        user_id: i64,
        scope: TokenScope,
    ) -> Result<Token, AuthError> {
        let token = generate_token(ttl, user_id, scope)?;
        self.store.insert_token(&token.record()).await?;
        debug!(user_id, scope = scope.as_str(), "Issued token");
        Ok(token)
    }

    /// Resolve a presented token to its stored record.
    ///
    /// Unknown and expired tokens both yield `InvalidToken`.
    pub async fn resolve_record(
        &self,
        plaintext: &str,
        scope: TokenScope,
    ) -> Result<TokenRecord, AuthError> {
        let hash = checked_hash(plaintext)?;

        let record = self
            .store
            .find_token(&hash, scope)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !bool::from(record.hash.as_slice().ct_eq(hash.as_slice())) {
            return Err(AuthError::InvalidToken);
        }
        if Utc::now() >= record.expiry {
            return Err(AuthError::InvalidToken);
        }

        Ok(record)
    }

    /// Resolve a presented token to the owning user id
    pub async fn resolve(&self, plaintext: &str, scope: TokenScope) -> Result<i64, AuthError> {
        Ok(self.resolve_record(plaintext, scope).await?.user_id)
    }

    /// Resolve and delete a token in one step, so it can be redeemed once
    pub async fn consume(&self, plaintext: &str, scope: TokenScope) -> Result<i64, AuthError> {
        let hash = checked_hash(plaintext)?;
        self.store
            .consume_token(&hash, scope, Utc::now())
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    /// Delete every token a user holds for `scope`; deleting none succeeds
    pub async fn revoke_all_for_user(
        &self,
        user_id: i64,
        scope: TokenScope,
    ) -> Result<u64, AuthError> {
        let removed = self.store.delete_tokens_for_user(user_id, scope).await?;
        debug!(user_id, scope = scope.as_str(), removed, "Revoked tokens");
        Ok(removed)
    }

    /// Remove tokens past their expiry
    pub async fn delete_expired(&self) -> Result<u64, AuthError> {
        Ok(self.store.delete_expired_tokens(Utc::now()).await?)
    }
}

/// Spawn a background task that periodically reaps expired tokens
pub fn spawn_token_reaper_task(
    tokens: TokenManager,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tracing::info!(
        "Starting background token reaper task (interval: {} seconds)",
        interval.as_secs()
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        // Skip the first tick (which fires immediately)
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match tokens.delete_expired().await {
                Ok(removed) if removed > 0 => {
                    tracing::info!("Reaped {} expired tokens", removed);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Error reaping expired tokens: {}", e);
                }
            }
        }
    })
}
