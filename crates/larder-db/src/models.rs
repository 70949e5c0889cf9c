//! Database models

use crate::utils::parse_datetime_or_now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Error type for parsing models from strings
#[derive(Debug, Clone)]
pub enum ParseError {
    InvalidUserRole(String),
    InvalidTokenScope(String),
    InvalidRestaurantStatus(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidUserRole(s) => write!(f, "Invalid user role: {}", s),
            ParseError::InvalidTokenScope(s) => write!(f, "Invalid token scope: {}", s),
            ParseError::InvalidRestaurantStatus(s) => {
                write!(f, "Invalid restaurant status: {}", s)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// User role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Customer,
    Seller,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Seller => "seller",
        }
    }
}

impl FromStr for UserRole {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(UserRole::Customer),
            "seller" => Ok(UserRole::Seller),
            _ => Err(ParseError::InvalidUserRole(s.to_string())),
        }
    }
}

/// User model
///
/// Carries no credential material, so it is safe to serialize into responses
/// and into the session cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
    pub restaurant_id: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user (for insertion)
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
}

/// Profile fields that may be changed after registration
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// Purpose a token was minted for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Activation,
    Authentication,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Activation => "activation",
            TokenScope::Authentication => "authentication",
        }
    }
}

impl FromStr for TokenScope {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activation" => Ok(TokenScope::Activation),
            "authentication" => Ok(TokenScope::Authentication),
            _ => Err(ParseError::InvalidTokenScope(s.to_string())),
        }
    }
}

/// Stored token row. Only the digest of the plaintext is persisted.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub hash: Vec<u8>,
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

/// Set of capability codes held by a user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub fn include(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Permissions(iter.into_iter().map(Into::into).collect())
    }
}

/// Restaurant status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RestaurantStatus {
    Open,
    Closed,
}

impl RestaurantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestaurantStatus::Open => "open",
            RestaurantStatus::Closed => "closed",
        }
    }
}

impl FromStr for RestaurantStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(RestaurantStatus::Open),
            "closed" => Ok(RestaurantStatus::Closed),
            _ => Err(ParseError::InvalidRestaurantStatus(s.to_string())),
        }
    }
}

/// Restaurant model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub name: String,
    pub country: String,
    pub full_address: String,
    pub cuisine: String,
    pub status: RestaurantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New restaurant (for insertion)
#[derive(Debug, Clone)]
pub struct NewRestaurant {
    pub owner_id: i64,
    pub name: String,
    pub country: String,
    pub full_address: String,
    pub cuisine: String,
    pub status: RestaurantStatus,
}

/// Partial restaurant update; `None` leaves a column untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateRestaurant {
    pub name: Option<String>,
    pub country: Option<String>,
    pub full_address: Option<String>,
    pub cuisine: Option<String>,
    pub status: Option<RestaurantStatus>,
}

/// New category (for insertion)
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub restaurant_id: i64,
    pub name: String,
}

/// Menu category belonging to a restaurant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub restaurant_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant_name: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Menu item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Menu {
    pub id: i64,
    pub category_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant_name: Option<String>,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

/// New menu item (for insertion)
#[derive(Debug, Clone)]
pub struct NewMenu {
    pub category_id: i64,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
}

// ==================== TryFrom Implementations ====================

impl TryFrom<&sqlx::sqlite::SqliteRow> for User {
    type Error = sqlx::Error;

    fn try_from(row: &sqlx::sqlite::SqliteRow) -> Result<Self, Self::Error> {
        let role_str: String = row.try_get("role")?;
        Ok(User {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            role: UserRole::from_str(&role_str).unwrap_or(UserRole::Customer),
            restaurant_id: row.try_get("restaurant_id")?,
            is_active: row.try_get("is_active")?,
            created_at: parse_datetime_or_now(&row.try_get::<String, _>("created_at")?),
            updated_at: parse_datetime_or_now(&row.try_get::<String, _>("updated_at")?),
        })
    }
}

impl TryFrom<&sqlx::sqlite::SqliteRow> for TokenRecord {
    type Error = sqlx::Error;

    fn try_from(row: &sqlx::sqlite::SqliteRow) -> Result<Self, Self::Error> {
        let scope_str: String = row.try_get("scope")?;
        let scope = TokenScope::from_str(&scope_str).map_err(|e| sqlx::Error::ColumnDecode {
            index: "scope".to_string(),
            source: Box::new(e),
        })?;
        let expiry: String = row.try_get("expiry")?;
        let expiry = chrono::DateTime::parse_from_rfc3339(&expiry)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "expiry".to_string(),
                source: Box::new(e),
            })?;
        Ok(TokenRecord {
            hash: row.try_get("hash")?,
            user_id: row.try_get("user_id")?,
            expiry,
            scope,
        })
    }
}

impl TryFrom<&sqlx::sqlite::SqliteRow> for Restaurant {
    type Error = sqlx::Error;

    fn try_from(row: &sqlx::sqlite::SqliteRow) -> Result<Self, Self::Error> {
        let status_str: String = row.try_get("status")?;
        Ok(Restaurant {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            name: row.try_get("name")?,
            country: row.try_get("country")?,
            full_address: row.try_get("full_address")?,
            cuisine: row.try_get("cuisine")?,
            status: RestaurantStatus::from_str(&status_str).unwrap_or(RestaurantStatus::Closed),
            created_at: parse_datetime_or_now(&row.try_get::<String, _>("created_at")?),
            updated_at: parse_datetime_or_now(&row.try_get::<String, _>("updated_at")?),
        })
    }
}

impl TryFrom<&sqlx::sqlite::SqliteRow> for Category {
    type Error = sqlx::Error;

    fn try_from(row: &sqlx::sqlite::SqliteRow) -> Result<Self, Self::Error> {
        Ok(Category {
            id: row.try_get("id")?,
            restaurant_id: row.try_get("restaurant_id")?,
            restaurant_name: row.try_get("restaurant_name").ok(),
            name: row.try_get("name")?,
            created_at: parse_datetime_or_now(&row.try_get::<String, _>("created_at")?),
        })
    }
}

impl TryFrom<&sqlx::sqlite::SqliteRow> for Menu {
    type Error = sqlx::Error;

    fn try_from(row: &sqlx::sqlite::SqliteRow) -> Result<Self, Self::Error> {
        Ok(Menu {
            id: row.try_get("id")?,
            category_id: row.try_get("category_id")?,
            category_name: row.try_get("category_name").ok(),
            restaurant_name: row.try_get("restaurant_name").ok(),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price_cents: row.try_get("price_cents")?,
            is_available: row.try_get("is_available")?,
            created_at: parse_datetime_or_now(&row.try_get::<String, _>("created_at")?),
        })
    }
}
