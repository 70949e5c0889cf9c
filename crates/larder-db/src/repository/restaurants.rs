//! Restaurant operations

use chrono::Utc;
use sqlx::Row;

use crate::error::DbError;
use crate::filters::{Filters, Metadata};
use crate::models::{NewRestaurant, Restaurant, UpdateRestaurant};
use crate::repository::Database;
use crate::utils::format_timestamp;

const RESTAURANT_COLUMNS: &str =
    "id, owner_id, name, country, full_address, cuisine, status, created_at, updated_at";

impl Database {
    // ==================== Restaurant Operations ====================

    /// Insert a restaurant. Name and owner are both unique; a clash surfaces
    /// as `DbError::Duplicate` naming the column.
    pub async fn insert_restaurant(&self, new: NewRestaurant) -> Result<Restaurant, DbError> {
        let now = Utc::now();

        let row = self
            .timed(
                sqlx::query(
                    r#"
                    INSERT INTO restaurants (owner_id, name, country, full_address, cuisine, status, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    RETURNING id
                    "#,
                )
                .bind(new.owner_id)
                .bind(&new.name)
                .bind(&new.country)
                .bind(&new.full_address)
                .bind(&new.cuisine)
                .bind(new.status.as_str())
                .bind(format_timestamp(now))
                .bind(format_timestamp(now))
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(Restaurant {
            id: row.try_get("id")?,
            owner_id: Some(new.owner_id),
            name: new.name,
            country: new.country,
            full_address: new.full_address,
            cuisine: new.cuisine,
            status: new.status,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a restaurant by ID
    pub async fn get_restaurant(&self, id: i64) -> Result<Option<Restaurant>, DbError> {
        let sql = format!("SELECT {RESTAURANT_COLUMNS} FROM restaurants WHERE id = ?");
        let result = self
            .timed(sqlx::query(&sql).bind(id).fetch_optional(&self.pool))
            .await?;

        result
            .map(|row| Restaurant::try_from(&row).map_err(DbError::from))
            .transpose()
    }

    /// Get the restaurant owned by a user, if any
    pub async fn get_restaurant_by_owner(
        &self,
        owner_id: i64,
    ) -> Result<Option<Restaurant>, DbError> {
        let sql = format!("SELECT {RESTAURANT_COLUMNS} FROM restaurants WHERE owner_id = ?");
        let result = self
            .timed(sqlx::query(&sql).bind(owner_id).fetch_optional(&self.pool))
            .await?;

        result
            .map(|row| Restaurant::try_from(&row).map_err(DbError::from))
            .transpose()
    }

    /// List restaurants, optionally filtered by a case-insensitive name
    /// fragment, with pagination metadata
    pub async fn list_restaurants(
        &self,
        name: Option<&str>,
        filters: &Filters,
    ) -> Result<(Vec<Restaurant>, Metadata), DbError> {
        let sql = format!(
            r#"
            SELECT COUNT(*) OVER() AS total_records, {RESTAURANT_COLUMNS}
            FROM restaurants
            WHERE (?1 IS NULL OR name LIKE '%' || ?1 || '%')
            ORDER BY {} {}, id ASC
            LIMIT ?2 OFFSET ?3
            "#,
            filters.sort_column(),
            filters.sort_direction()
        );

        let rows = self
            .timed(
                sqlx::query(&sql)
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
        let restaurants = rows
            .iter()
            .map(|row| Restaurant::try_from(row).map_err(DbError::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((
            restaurants,
            Metadata::calculate(total, filters.page, filters.page_size),
        ))
    }

    /// Apply a partial update
    pub async fn update_restaurant(
        &self,
        id: i64,
        update: UpdateRestaurant,
    ) -> Result<bool, DbError> {
        let result = self
            .timed(
                sqlx::query(
                    r#"
                    UPDATE restaurants
                    SET name = COALESCE(?, name),
                        country = COALESCE(?, country),
                        full_address = COALESCE(?, full_address),
                        cuisine = COALESCE(?, cuisine),
                        status = COALESCE(?, status),
                        updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(update.name)
                .bind(update.country)
                .bind(update.full_address)
                .bind(update.cuisine)
                .bind(update.status.map(|s| s.as_str()))
                .bind(format_timestamp(Utc::now()))
                .bind(id)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a restaurant; its categories and menu items cascade
    pub async fn delete_restaurant(&self, id: i64) -> Result<bool, DbError> {
        let result = self
            .timed(
                sqlx::query("DELETE FROM restaurants WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::filters::Filters;
    use crate::models::{NewRestaurant, RestaurantStatus, UpdateRestaurant, UserRole};
    use crate::repository::test_support::new_user;
    use crate::{Database, DbError};

    pub const SAFE: &[&str] = &["id", "name", "-id", "-name"];

    pub fn filters(sort: &str, page: i64, page_size: i64) -> Filters {
        Filters {
            page,
            page_size,
            sort: sort.to_string(),
            sort_safe_list: SAFE,
        }
    }

    pub async fn seller_with_restaurant(db: &Database, email: &str, name: &str) -> (i64, i64) {
        let seller = db.insert_user(new_user(email, UserRole::Seller)).await.unwrap();
        let restaurant = db
            .insert_restaurant(NewRestaurant {
                owner_id: seller.id,
                name: name.to_string(),
                country: "Japan".to_string(),
                full_address: "1-1 Chiyoda, Tokyo".to_string(),
                cuisine: "Japanese".to_string(),
                status: RestaurantStatus::Open,
            })
            .await
            .unwrap();
        (seller.id, restaurant.id)
    }

    #[tokio::test]
    async fn test_insert_and_owner_lookup() {
        let db = Database::in_memory().await.unwrap();
        let (seller_id, restaurant_id) = seller_with_restaurant(&db, "s@example.com", "Sora").await;

        let fetched = db.get_restaurant(restaurant_id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Sora");
        assert_eq!(fetched.owner_id, Some(seller_id));

        let owned = db.get_restaurant_by_owner(seller_id).await.unwrap().unwrap();
        assert_eq!(owned.id, restaurant_id);

        let user = db.get_user_by_id(seller_id).await.unwrap().unwrap();
        assert_eq!(user.restaurant_id, Some(restaurant_id));
    }

    #[tokio::test]
    async fn test_one_restaurant_per_owner() {
        let db = Database::in_memory().await.unwrap();
        let (seller_id, _) = seller_with_restaurant(&db, "s@example.com", "Sora").await;

        let err = db
            .insert_restaurant(NewRestaurant {
                owner_id: seller_id,
                name: "Umi".to_string(),
                country: "Japan".to_string(),
                full_address: "Osaka".to_string(),
                cuisine: "Seafood".to_string(),
                status: RestaurantStatus::Closed,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)));
        assert_eq!(err.duplicate_field(), Some("owner_id"));
    }

    #[tokio::test]
    async fn test_list_with_filters() {
        let db = Database::in_memory().await.unwrap();
        seller_with_restaurant(&db, "a@example.com", "Alpha Diner").await;
        seller_with_restaurant(&db, "b@example.com", "Beta Bistro").await;
        seller_with_restaurant(&db, "c@example.com", "Gamma Diner").await;

        let (all, meta) = db.list_restaurants(None, &filters("-name", 1, 2)).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Gamma Diner");
        assert_eq!(meta.total_records, 3);
        assert_eq!(meta.last_page, 2);

        let (diners, meta) = db
            .list_restaurants(Some("diner"), &filters("name", 1, 10))
            .await
            .unwrap();
        let names: Vec<_> = diners.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha Diner", "Gamma Diner"]);
        assert_eq!(meta.total_records, 2);

        let (none, meta) = db
            .list_restaurants(Some("pizza"), &filters("name", 1, 10))
            .await
            .unwrap();
        assert!(none.is_empty());
        assert_eq!(meta.total_records, 0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = Database::in_memory().await.unwrap();
        let (_, id) = seller_with_restaurant(&db, "s@example.com", "Sora").await;

        let update = UpdateRestaurant {
            status: Some(RestaurantStatus::Closed),
            ..Default::default()
        };
        assert!(db.update_restaurant(id, update).await.unwrap());
        let updated = db.get_restaurant(id).await.unwrap().unwrap();
        assert_eq!(updated.status, RestaurantStatus::Closed);
        assert_eq!(updated.name, "Sora");

        assert!(db.delete_restaurant(id).await.unwrap());
        assert!(db.get_restaurant(id).await.unwrap().is_none());
        assert!(!db.update_restaurant(id, UpdateRestaurant::default()).await.unwrap());
    }
}
