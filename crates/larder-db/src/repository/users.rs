//! User operations

use chrono::Utc;
use sqlx::Row;

use crate::error::DbError;
use crate::models::{NewUser, UpdateUser, User};
use crate::repository::Database;
use crate::utils::format_timestamp;

const USER_COLUMNS: &str = r#"
    u.id, u.first_name, u.last_name, u.email, u.role, u.is_active,
    u.created_at, u.updated_at,
    (SELECT r.id FROM restaurants r WHERE r.owner_id = u.id) AS restaurant_id
"#;

impl Database {
    // ==================== User Operations ====================

    /// Insert a new user. A taken email surfaces as `DbError::Duplicate`.
    pub async fn insert_user(&self, user: NewUser) -> Result<User, DbError> {
        let now = Utc::now();

        let row = self
            .timed(
                sqlx::query(
                    r#"
                    INSERT INTO users (first_name, last_name, email, password_hash, role, is_active, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, 0, ?, ?)
                    RETURNING id
                    "#,
                )
                .bind(&user.first_name)
                .bind(&user.last_name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.role.as_str())
                .bind(format_timestamp(now))
                .bind(format_timestamp(now))
                .fetch_one(&self.pool),
            )
            .await?;

        let id: i64 = row.try_get("id").map_err(DbError::from)?;

        Ok(User {
            id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role,
            restaurant_id: None,
            is_active: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a user by ID
    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, DbError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?");
        let result = self
            .timed(sqlx::query(&sql).bind(id).fetch_optional(&self.pool))
            .await?;

        result.map(|row| User::try_from(&row).map_err(DbError::from)).transpose()
    }

    /// Get a user by email (case-insensitive)
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = ?");
        let result = self
            .timed(sqlx::query(&sql).bind(email).fetch_optional(&self.pool))
            .await?;

        result.map(|row| User::try_from(&row).map_err(DbError::from)).transpose()
    }

    /// Get a user together with their stored password hash, for login
    pub async fn get_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<(User, String)>, DbError> {
        let sql = format!("SELECT {USER_COLUMNS}, u.password_hash FROM users u WHERE u.email = ?");
        let result = self
            .timed(sqlx::query(&sql).bind(email).fetch_optional(&self.pool))
            .await?;

        match result {
            Some(row) => {
                let user = User::try_from(&row)?;
                let hash: String = row.try_get("password_hash")?;
                Ok(Some((user, hash)))
            }
            None => Ok(None),
        }
    }

    /// Get the stored password hash for a user
    pub async fn get_password_hash(&self, id: i64) -> Result<Option<String>, DbError> {
        let result = self
            .timed(
                sqlx::query("SELECT password_hash FROM users WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool),
            )
            .await?;

        result
            .map(|row| row.try_get("password_hash").map_err(DbError::from))
            .transpose()
    }

    /// Mark a user as activated
    pub async fn activate_user(&self, id: i64) -> Result<bool, DbError> {
        let result = self
            .timed(
                sqlx::query("UPDATE users SET is_active = 1, updated_at = ? WHERE id = ?")
                    .bind(format_timestamp(Utc::now()))
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update profile fields
    pub async fn update_user(&self, id: i64, update: UpdateUser) -> Result<bool, DbError> {
        let result = self
            .timed(
                sqlx::query(
                    r#"
                    UPDATE users
                    SET first_name = COALESCE(?, first_name),
                        last_name = COALESCE(?, last_name),
                        email = COALESCE(?, email),
                        updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(update.first_name)
                .bind(update.last_name)
                .bind(update.email)
                .bind(format_timestamp(Utc::now()))
                .bind(id)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update user password
    pub async fn update_user_password(&self, id: i64, password_hash: &str) -> Result<bool, DbError> {
        let result = self
            .timed(
                sqlx::query(
                    r#"
                    UPDATE users
                    SET password_hash = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(password_hash)
                .bind(format_timestamp(Utc::now()))
                .bind(id)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user. Tokens and permission grants cascade.
    pub async fn delete_user(&self, id: i64) -> Result<bool, DbError> {
        let result = self
            .timed(
                sqlx::query("DELETE FROM users WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
