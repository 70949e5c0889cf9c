//! Menu item operations

use chrono::Utc;
use sqlx::Row;

use crate::error::DbError;
use crate::filters::{Filters, Metadata};
use crate::models::{Menu, NewMenu};
use crate::repository::Database;
use crate::utils::format_timestamp;

/// Narrowing applied to menu listings
#[derive(Debug, Clone, Copy, Default)]
pub struct MenuScope<'a> {
    pub restaurant_id: Option<i64>,
    pub category_id: Option<i64>,
    pub name: Option<&'a str>,
}

impl Database {
    // ==================== Menu Operations ====================

    /// Insert a menu item; new items start out available
    pub async fn insert_menu(&self, new: NewMenu) -> Result<Menu, DbError> {
        let now = Utc::now();

        let row = self
            .timed(
                sqlx::query(
                    r#"
                    INSERT INTO menus (category_id, name, description, price_cents, is_available, created_at)
                    VALUES (?, ?, ?, ?, 1, ?)
                    RETURNING id
                    "#,
                )
                .bind(new.category_id)
                .bind(&new.name)
                .bind(&new.description)
                .bind(new.price_cents)
                .bind(format_timestamp(now))
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(Menu {
            id: row.try_get("id")?,
            category_id: new.category_id,
            category_name: None,
            restaurant_name: None,
            name: new.name,
            description: new.description,
            price_cents: new.price_cents,
            is_available: true,
            created_at: now,
        })
    }

    /// List menu items joined with their category and restaurant names
    pub async fn list_menus(
        &self,
        scope: MenuScope<'_>,
        filters: &Filters,
    ) -> Result<(Vec<Menu>, Metadata), DbError> {
        let sql = format!(
            r#"
            SELECT COUNT(*) OVER() AS total_records,
                   m.id, m.category_id, c.name AS category_name, r.name AS restaurant_name,
                   m.name, m.description, m.price_cents, m.is_available, m.created_at
            FROM menus m
            INNER JOIN categories c ON c.id = m.category_id
            INNER JOIN restaurants r ON r.id = c.restaurant_id
            WHERE (?1 IS NULL OR r.id = ?1)
              AND (?2 IS NULL OR c.id = ?2)
              AND (?3 IS NULL OR m.name LIKE '%' || ?3 || '%')
            ORDER BY m.{} {}, m.id ASC
            LIMIT ?4 OFFSET ?5
            "#,
            filters.sort_column(),
            filters.sort_direction()
        );

        let rows = self
            .timed(
                sqlx::query(&sql)
                    .bind(scope.restaurant_id)
                    .bind(scope.category_id)
                    .bind(scope.name)
                    .bind(filters.limit())
                    .bind(filters.offset())
                    .fetch_all(&self.pool),
            )
            .await?;

        let total: i64 = match rows.first() {
            Some(row) => row.try_get("total_records")?,
            None => 0,
        };
        let menus = rows
            .iter()
            .map(|row| Menu::try_from(row).map_err(DbError::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((menus, Metadata::calculate(total, filters.page, filters.page_size)))
    }
}
