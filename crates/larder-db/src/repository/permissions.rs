//! Permission operations

use sqlx::Row;

use crate::error::DbError;
use crate::models::Permissions;
use crate::repository::Database;

impl Database {
    // ==================== Permission Operations ====================

    /// All permission codes held by a user (possibly empty)
    pub async fn get_permissions(&self, user_id: i64) -> Result<Permissions, DbError> {
        let rows = self
            .timed(
                sqlx::query(
                    r#"
                    SELECT p.code
                    FROM permissions p
                    INNER JOIN users_permissions up ON up.permission_id = p.id
                    WHERE up.user_id = ?
                    "#,
                )
                .bind(user_id)
                .fetch_all(&self.pool),
            )
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("code").map_err(DbError::from))
            .collect()
    }

    /// Grant codes to a user. Re-granting is a no-op; unknown codes are
    /// registered on first use.
    pub async fn grant_permissions(&self, user_id: i64, codes: &[&str]) -> Result<(), DbError> {
        let pool = &self.pool;
        self.timed(async move {
            let mut tx = pool.begin().await?;
            for code in codes {
                sqlx::query("INSERT OR IGNORE INTO permissions (code) VALUES (?)")
                    .bind(*code)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO users_permissions (user_id, permission_id)
                    SELECT ?, id FROM permissions WHERE code = ?
                    "#,
                )
                .bind(user_id)
                .bind(*code)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await
        })
        .await
    }

    /// Revoke a single code; returns whether the user held it
    pub async fn revoke_permission(&self, user_id: i64, code: &str) -> Result<bool, DbError> {
        let result = self
            .timed(
                sqlx::query(
                    r#"
                    DELETE FROM users_permissions
                    WHERE user_id = ?
                      AND permission_id = (SELECT id FROM permissions WHERE code = ?)
                    "#,
                )
                .bind(user_id)
                .bind(code)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Every registered permission code, sorted
    pub async fn permission_codes(&self) -> Result<Vec<String>, DbError> {
        let rows = self
            .timed(sqlx::query("SELECT code FROM permissions ORDER BY code").fetch_all(&self.pool))
            .await?;

        rows.iter()
            .map(|row| row.try_get("code").map_err(DbError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::models::UserRole;
    use crate::repository::test_support::new_user;
    use crate::Database;

    #[tokio::test]
    async fn test_grant_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        let user = db
            .insert_user(new_user("perm@example.com", UserRole::Seller))
            .await
            .unwrap();

        assert!(db.get_permissions(user.id).await.unwrap().is_empty());

        db.grant_permissions(user.id, &["restaurant:read", "restaurant:write"])
            .await
            .unwrap();
        db.grant_permissions(user.id, &["restaurant:read"]).await.unwrap();

        let perms = db.get_permissions(user.id).await.unwrap();
        assert_eq!(perms.len(), 2);
        assert!(perms.include("restaurant:read"));
        assert!(perms.include("restaurant:write"));
    }

    #[tokio::test]
    async fn test_unknown_codes_are_registered() {
        let db = Database::in_memory().await.unwrap();
        let user = db
            .insert_user(new_user("new@example.com", UserRole::Customer))
            .await
            .unwrap();

        db.grant_permissions(user.id, &["menus:publish"]).await.unwrap();
        assert!(db.get_permissions(user.id).await.unwrap().include("menus:publish"));
        assert!(db.permission_codes().await.unwrap().contains(&"menus:publish".to_string()));
    }

    #[tokio::test]
    async fn test_revoke() {
        let db = Database::in_memory().await.unwrap();
        let user = db
            .insert_user(new_user("rev@example.com", UserRole::Seller))
            .await
            .unwrap();
        db.grant_permissions(user.id, &["restaurant:read", "restaurant:write"])
            .await
            .unwrap();

        assert!(db.revoke_permission(user.id, "restaurant:write").await.unwrap());
        assert!(!db.revoke_permission(user.id, "restaurant:write").await.unwrap());

        let perms = db.get_permissions(user.id).await.unwrap();
        assert!(perms.include("restaurant:read"));
        assert!(!perms.include("restaurant:write"));
    }
}
