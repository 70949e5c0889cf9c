//! Category operations

use chrono::Utc;
use sqlx::Row;

use crate::error::DbError;
use crate::filters::{Filters, Metadata};
use crate::models::{Category, NewCategory};
use crate::repository::Database;
use crate::utils::format_timestamp;

impl Database {
    // ==================== Category Operations ====================

    /// Insert a category. Names are unique per restaurant.
    pub async fn insert_category(&self, new: NewCategory) -> Result<Category, DbError> {
        let now = Utc::now();

        let row = self
            .timed(
                sqlx::query(
                    r#"
                    INSERT INTO categories (restaurant_id, name, created_at)
                    VALUES (?, ?, ?)
                    RETURNING id
                    "#,
                )
                .bind(new.restaurant_id)
                .bind(&new.name)
                .bind(format_timestamp(now))
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(Category {
            id: row.try_get("id")?,
            restaurant_id: new.restaurant_id,
            restaurant_name: None,
            name: new.name,
            created_at: now,
        })
    }

    /// Get a category by ID, joined with its restaurant's name
    pub async fn get_category(&self, id: i64) -> Result<Option<Category>, DbError> {
        let result = self
            .timed(
                sqlx::query(
                    r#"
                    SELECT c.id, c.restaurant_id, r.name AS restaurant_name, c.name, c.created_at
                    FROM categories c
                    INNER JOIN restaurants r ON r.id = c.restaurant_id
                    WHERE c.id = ?
                    "#,
                )
                .bind(id)
                .fetch_optional(&self.pool),
            )
            .await?;

        result
            .map(|row| Category::try_from(&row).map_err(DbError::from))
            .transpose()
    }

    /// List categories, optionally narrowed to one restaurant and/or a name
    /// fragment
    pub async fn list_categories(
        &self,
        restaurant_id: Option<i64>,
        name: Option<&str>,
        filters: &Filters,
    ) -> Result<(Vec<Category>, Metadata), DbError> {
        let sql = format!(
            r#"
            SELECT COUNT(*) OVER() AS total_records,
                   c.id, c.restaurant_id, r.name AS restaurant_name, c.name, c.created_at
            FROM categories c
            INNER JOIN restaurants r ON r.id = c.restaurant_id
            WHERE (?1 IS NULL OR c.restaurant_id = ?1)
              AND (?2 IS NULL OR c.name LIKE '%' || ?2 || '%')
            ORDER BY c.{} {}, c.id ASC
            LIMIT ?3 OFFSET ?4
            "#,
            filters.sort_column(),
            filters.sort_direction()
        );

        let rows = self
            .timed(
                sqlx::query(&sql)
                    .bind(restaurant_id)
                    .bind(name)
                    .bind(filters.limit())
                    .bind(filters.offset())
                    .fetch_all(&self.pool),
            )
            .await?;

        let total: i64 = match rows.first() {
            Some(row) => row.try_get("total_records")?,
            None => 0,
        };
        let categories = rows
            .iter()
            .map(|row| Category::try_from(row).map_err(DbError::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((
            categories,
            Metadata::calculate(total, filters.page, filters.page_size),
        ))
    }
}
