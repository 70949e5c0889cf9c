//! Token operations
//!
//! Tokens are stored by the SHA-256 digest of their plaintext; the plaintext
//! itself never reaches this layer.

use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::error::DbError;
use crate::models::{TokenRecord, TokenScope};
use crate::repository::Database;
use crate::utils::format_timestamp;

impl Database {
    // ==================== Token Operations ====================

    /// Persist a token record
    pub async fn insert_token(&self, token: &TokenRecord) -> Result<(), DbError> {
        self.timed(
            sqlx::query(
                r#"
                INSERT INTO tokens (hash, user_id, expiry, scope)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&token.hash)
            .bind(token.user_id)
            .bind(format_timestamp(token.expiry))
            .bind(token.scope.as_str())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    /// Find a token by digest and scope, expired or not
    pub async fn find_token(
        &self,
        hash: &[u8],
        scope: TokenScope,
    ) -> Result<Option<TokenRecord>, DbError> {
        let result = self
            .timed(
                sqlx::query(
                    r#"
                    SELECT hash, user_id, expiry, scope
                    FROM tokens
                    WHERE hash = ? AND scope = ?
                    "#,
                )
                .bind(hash)
                .bind(scope.as_str())
                .fetch_optional(&self.pool),
            )
            .await?;

        result
            .map(|row| TokenRecord::try_from(&row).map_err(DbError::from))
            .transpose()
    }

    /// Atomically delete an unexpired token and return its owner.
    ///
    /// Two concurrent calls for the same digest cannot both observe the row.
    pub async fn consume_token(
        &self,
        hash: &[u8],
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, DbError> {
        let result = self
            .timed(
                sqlx::query(
                    r#"
                    DELETE FROM tokens
                    WHERE hash = ? AND scope = ? AND expiry > ?
                    RETURNING user_id
                    "#,
                )
                .bind(hash)
                .bind(scope.as_str())
                .bind(format_timestamp(now))
                .fetch_optional(&self.pool),
            )
            .await?;

        result
            .map(|row| row.try_get("user_id").map_err(DbError::from))
            .transpose()
    }

    /// Digests of every token a user holds for a scope
    pub async fn token_hashes_for_user(
        &self,
        user_id: i64,
        scope: TokenScope,
    ) -> Result<Vec<Vec<u8>>, DbError> {
        let rows = self
            .timed(
                sqlx::query("SELECT hash FROM tokens WHERE user_id = ? AND scope = ?")
                    .bind(user_id)
                    .bind(scope.as_str())
                    .fetch_all(&self.pool),
            )
            .await?;

        rows.iter()
            .map(|row| row.try_get("hash").map_err(DbError::from))
            .collect()
    }

    /// Delete every token a user holds for a scope; returns the number removed
    pub async fn delete_tokens_for_user(
        &self,
        user_id: i64,
        scope: TokenScope,
    ) -> Result<u64, DbError> {
        let result = self
            .timed(
                sqlx::query("DELETE FROM tokens WHERE user_id = ? AND scope = ?")
                    .bind(user_id)
                    .bind(scope.as_str())
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete tokens whose expiry is at or before `now`
    pub async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        let result = self
            .timed(
                sqlx::query("DELETE FROM tokens WHERE expiry <= ?")
                    .bind(format_timestamp(now))
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::models::{TokenRecord, TokenScope, UserRole};
    use crate::repository::test_support::new_user;
    use crate::{Database, DbError};

    async fn setup() -> (Database, i64) {
        let db = Database::in_memory().await.unwrap();
        let user = db
            .insert_user(new_user("tok@example.com", UserRole::Customer))
            .await
            .unwrap();
        (db, user.id)
    }

    fn record(hash: u8, user_id: i64, ttl: Duration, scope: TokenScope) -> TokenRecord {
        TokenRecord {
            hash: vec![hash; 32],
            user_id,
            expiry: Utc::now() + ttl,
            scope,
        }
    }

    #[tokio::test]
    async fn test_find_token_respects_scope() {
        let (db, user_id) = setup().await;
        let token = record(1, user_id, Duration::hours(1), TokenScope::Activation);
        db.insert_token(&token).await.unwrap();

        let found = db
            .find_token(&token.hash, TokenScope::Activation)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, user_id);
        assert_eq!(found.scope, TokenScope::Activation);

        assert!(db
            .find_token(&token.hash, TokenScope::Authentication)
            .await
            .unwrap()
            .is_none());
        assert!(db
            .find_token(&[9u8; 32], TokenScope::Activation)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected() {
        let (db, user_id) = setup().await;
        let token = record(2, user_id, Duration::hours(1), TokenScope::Authentication);
        db.insert_token(&token).await.unwrap();
        let err = db.insert_token(&token).await.unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_consume_token_only_once() {
        let (db, user_id) = setup().await;
        let token = record(3, user_id, Duration::hours(72), TokenScope::Activation);
        db.insert_token(&token).await.unwrap();

        let now = Utc::now();
        let first = db.consume_token(&token.hash, TokenScope::Activation, now).await.unwrap();
        let second = db.consume_token(&token.hash, TokenScope::Activation, now).await.unwrap();
        assert_eq!(first, Some(user_id));
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn test_consume_rejects_expired() {
        let (db, user_id) = setup().await;
        let token = record(4, user_id, Duration::seconds(-1), TokenScope::Activation);
        db.insert_token(&token).await.unwrap();

        let consumed = db
            .consume_token(&token.hash, TokenScope::Activation, Utc::now())
            .await
            .unwrap();
        assert_eq!(consumed, None);
    }

    #[tokio::test]
    async fn test_delete_for_user_is_idempotent() {
        let (db, user_id) = setup().await;
        db.insert_token(&record(5, user_id, Duration::hours(1), TokenScope::Authentication))
            .await
            .unwrap();
        db.insert_token(&record(6, user_id, Duration::hours(1), TokenScope::Authentication))
            .await
            .unwrap();
        db.insert_token(&record(7, user_id, Duration::hours(1), TokenScope::Activation))
            .await
            .unwrap();

        let hashes = db
            .token_hashes_for_user(user_id, TokenScope::Authentication)
            .await
            .unwrap();
        assert_eq!(hashes.len(), 2);

        let removed = db
            .delete_tokens_for_user(user_id, TokenScope::Authentication)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        let removed = db
            .delete_tokens_for_user(user_id, TokenScope::Authentication)
            .await
            .unwrap();
        assert_eq!(removed, 0);

        // Other scopes are untouched
        assert_eq!(
            db.token_hashes_for_user(user_id, TokenScope::Activation)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_expired_tokens() {
        let (db, user_id) = setup().await;
        db.insert_token(&record(8, user_id, Duration::seconds(-5), TokenScope::Authentication))
            .await
            .unwrap();
        db.insert_token(&record(9, user_id, Duration::hours(1), TokenScope::Authentication))
            .await
            .unwrap();

        assert_eq!(db.delete_expired_tokens(Utc::now()).await.unwrap(), 1);
        assert_eq!(db.delete_expired_tokens(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tokens_cascade_with_user() {
        let (db, user_id) = setup().await;
        db.insert_token(&record(10, user_id, Duration::hours(1), TokenScope::Authentication))
            .await
            .unwrap();
        db.delete_user(user_id).await.unwrap();
        assert!(db
            .find_token(&[10u8; 32], TokenScope::Authentication)
            .await
            .unwrap()
            .is_none());
    }
}
