//! Permission store

use larder_db::Permissions;
use std::sync::Arc;
use tracing::debug;

use crate::error::AuthError;
use crate::store::AccountStore;

/// Read access to restaurants, categories and menus
pub const RESTAURANT_READ: &str = "restaurant:read";

/// Create and modify restaurants, categories and menus
pub const RESTAURANT_WRITE: &str = "restaurant:write";

#[derive(Clone)]
pub struct PermissionStore {
    store: Arc<dyn AccountStore>,
}

impl PermissionStore {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Every code the user holds; an empty set is not an error
    pub async fn get_all(&self, user_id: i64) -> Result<Permissions, AuthError> {
        Ok(self.store.get_permissions(user_id).await?)
    }

    /// Grant codes; already-held codes are left alone
    pub async fn grant(&self, user_id: i64, codes: &[&str]) -> Result<(), AuthError> {
        self.store.grant_permissions(user_id, codes).await?;
        debug!(user_id, ?codes, "Granted permissions");
        Ok(())
    }

    pub async fn revoke(&self, user_id: i64, code: &str) -> Result<bool, AuthError> {
        Ok(self.store.revoke_permission(user_id, code).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::database_with_user;

    #[tokio::test]
    async fn test_grant_revoke_include() {
        let (db, user) = database_with_user("p@example.com").await;
        let perms = PermissionStore::new(Arc::new(db));

        assert!(perms.get_all(user.id).await.unwrap().is_empty());

        perms.grant(user.id, &[RESTAURANT_READ]).await.unwrap();
        perms.grant(user.id, &[RESTAURANT_READ]).await.unwrap();
        let held = perms.get_all(user.id).await.unwrap();
        assert!(held.include(RESTAURANT_READ));
        assert!(!held.include(RESTAURANT_WRITE));
        assert_eq!(held.len(), 1);

        assert!(perms.revoke(user.id, RESTAURANT_READ).await.unwrap());
        assert!(perms.get_all(user.id).await.unwrap().is_empty());
    }
}
