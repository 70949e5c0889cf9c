//! Persistence seam for the authentication core

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use larder_db::{Database, DbError, Permissions, TokenRecord, TokenScope, User};

/// The slice of the relational store that token resolution, session lookup
/// and permission checks depend on
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), DbError>;

    async fn find_token(
        &self,
        hash: &[u8],
        scope: TokenScope,
    ) -> Result<Option<TokenRecord>, DbError>;

    /// Atomically remove an unexpired token, returning its owner
    async fn consume_token(
        &self,
        hash: &[u8],
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, DbError>;

    async fn token_hashes_for_user(
        &self,
        user_id: i64,
        scope: TokenScope,
    ) -> Result<Vec<Vec<u8>>, DbError>;

    async fn delete_tokens_for_user(&self, user_id: i64, scope: TokenScope)
    -> Result<u64, DbError>;

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, DbError>;

    async fn get_user(&self, id: i64) -> Result<Option<User>, DbError>;

    async fn get_permissions(&self, user_id: i64) -> Result<Permissions, DbError>;

    async fn grant_permissions(&self, user_id: i64, codes: &[&str]) -> Result<(), DbError>;

    async fn revoke_permission(&self, user_id: i64, code: &str) -> Result<bool, DbError>;
}

#[async_trait]
impl AccountStore for Database {
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), DbError> {
        Database::insert_token(self, token).await
    }

    async fn find_token(
        &self,
        hash: &[u8],
        scope: TokenScope,
    ) -> Result<Option<TokenRecord>, DbError> {
        Database::find_token(self, hash, scope).await
    }

    async fn consume_token(
        &self,
        hash: &[u8],
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, DbError> {
        Database::consume_token(self, hash, scope, now).await
    }

    async fn token_hashes_for_user(
        &self,
        user_id: i64,
        scope: TokenScope,
    ) -> Result<Vec<Vec<u8>>, DbError> {
        Database::token_hashes_for_user(self, user_id, scope).await
    }

    async fn delete_tokens_for_user(
        &self,
        user_id: i64,
        scope: TokenScope,
    ) -> Result<u64, DbError> {
        Database::delete_tokens_for_user(self, user_id, scope).await
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        Database::delete_expired_tokens(self, now).await
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, DbError> {
        self.get_user_by_id(id).await
    }

    async fn get_permissions(&self, user_id: i64) -> Result<Permissions, DbError> {
        Database::get_permissions(self, user_id).await
    }

    async fn grant_permissions(&self, user_id: i64, codes: &[&str]) -> Result<(), DbError> {
        Database::grant_permissions(self, user_id, codes).await
    }

    async fn revoke_permission(&self, user_id: i64, code: &str) -> Result<bool, DbError> {
        Database::revoke_permission(self, user_id, code).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Store wrapper that counts calls, for asserting cache behaviour

    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    pub struct CountingStore {
        pub inner: Database,
        pub calls: Arc<AtomicUsize>,
    }

    impl CountingStore {
        pub fn new(inner: Database) -> Self {
            Self {
                inner,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl AccountStore for CountingStore {
        async fn insert_token(&self, token: &TokenRecord) -> Result<(), DbError> {
            self.hit();
            self.inner.insert_token(token).await
        }

        async fn find_token(
            &self,
            hash: &[u8],
            scope: TokenScope,
        ) -> Result<Option<TokenRecord>, DbError> {
            self.hit();
            self.inner.find_token(hash, scope).await
        }

        async fn consume_token(
            &self,
            hash: &[u8],
            scope: TokenScope,
            now: DateTime<Utc>,
        ) -> Result<Option<i64>, DbError> {
            self.hit();
            self.inner.consume_token(hash, scope, now).await
        }

        async fn token_hashes_for_user(
            &self,
            user_id: i64,
            scope: TokenScope,
        ) -> Result<Vec<Vec<u8>>, DbError> {
            self.hit();
            self.inner.token_hashes_for_user(user_id, scope).await
        }

        async fn delete_tokens_for_user(
            &self,
            user_id: i64,
            scope: TokenScope,
        ) -> Result<u64, DbError> {
            self.hit();
            self.inner.delete_tokens_for_user(user_id, scope).await
        }

        async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
            self.hit();
            self.inner.delete_expired_tokens(now).await
        }

        async fn get_user(&self, id: i64) -> Result<Option<User>, DbError> {
            self.hit();
            self.inner.get_user_by_id(id).await
        }

        async fn get_permissions(&self, user_id: i64) -> Result<Permissions, DbError> {
            self.hit();
            self.inner.get_permissions(user_id).await
        }

        async fn grant_permissions(&self, user_id: i64, codes: &[&str]) -> Result<(), DbError> {
            self.hit();
            self.inner.grant_permissions(user_id, codes).await
        }

        async fn revoke_permission(&self, user_id: i64, code: &str) -> Result<bool, DbError> {
            self.hit();
            self.inner.revoke_permission(user_id, code).await
        }
    }

    /// Store that can hold a single `find_token` or `get_user` call after it
    /// has read its row, until the test releases it
    pub struct PausingStore {
        pub inner: Database,
        pause_find_token: AtomicBool,
        pause_get_user: AtomicBool,
        pub reached: Notify,
        pub resume: Notify,
    }

    impl PausingStore {
        pub fn new(inner: Database) -> Self {
            Self {
                inner,
                pause_find_token: AtomicBool::new(false),
                pause_get_user: AtomicBool::new(false),
                reached: Notify::new(),
                resume: Notify::new(),
            }
        }

        pub fn pause_next_find_token(&self) {
            self.pause_find_token.store(true, Ordering::SeqCst);
        }

        pub fn pause_next_get_user(&self) {
            self.pause_get_user.store(true, Ordering::SeqCst);
        }

        async fn hold(&self, flag: &AtomicBool) {
            if flag.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.resume.notified().await;
            }
        }
    }

    #[async_trait]
    impl AccountStore for PausingStore {
        async fn insert_token(&self, token: &TokenRecord) -> Result<(), DbError> {
            self.inner.insert_token(token).await
        }

        async fn find_token(
            &self,
            hash: &[u8],
            scope: TokenScope,
        ) -> Result<Option<TokenRecord>, DbError> {
            let found = self.inner.find_token(hash, scope).await;
            self.hold(&self.pause_find_token).await;
            found
        }

        async fn consume_token(
            &self,
            hash: &[u8],
            scope: TokenScope,
            now: DateTime<Utc>,
        ) -> Result<Option<i64>, DbError> {
            self.inner.consume_token(hash, scope, now).await
        }

        async fn token_hashes_for_user(
            &self,
            user_id: i64,
            scope: TokenScope,
        ) -> Result<Vec<Vec<u8>>, DbError> {
            self.inner.token_hashes_for_user(user_id, scope).await
        }

        async fn delete_tokens_for_user(
            &self,
            user_id: i64,
            scope: TokenScope,
        ) -> Result<u64, DbError> {
            self.inner.delete_tokens_for_user(user_id, scope).await
        }

        async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
            self.inner.delete_expired_tokens(now).await
        }

        async fn get_user(&self, id: i64) -> Result<Option<User>, DbError> {
            let found = self.inner.get_user_by_id(id).await;
            self.hold(&self.pause_get_user).await;
            found
        }

        async fn get_permissions(&self, user_id: i64) -> Result<Permissions, DbError> {
            self.inner.get_permissions(user_id).await
        }

        async fn grant_permissions(&self, user_id: i64, codes: &[&str]) -> Result<(), DbError> {
            self.inner.grant_permissions(user_id, codes).await
        }

        async fn revoke_permission(&self, user_id: i64, code: &str) -> Result<bool, DbError> {
            self.inner.revoke_permission(user_id, code).await
        }
    }

    /// Fresh in-memory database with one customer
    pub async fn database_with_user(email: &str) -> (Database, User) {
        let db = Database::in_memory().await.unwrap();
        let user = db
            .insert_user(larder_db::NewUser {
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                email: email.to_string(),
                password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
                role: larder_db::UserRole::Customer,
            })
            .await
            .unwrap();
        (db, user)
    }
}
