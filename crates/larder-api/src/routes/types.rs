//! Request and response bodies

use larder_auth::Token;
use larder_db::{Category, Menu, Metadata, Restaurant, User};
use serde::{Deserialize, Serialize};

// ==================== Account Types ====================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Serialize)]
pub struct RegisteredResponse {
    pub user: User,
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub authentication_token: Token,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// ==================== Restaurant Types ====================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRestaurantRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub full_address: String,
    #[serde(default)]
    pub cuisine: String,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRestaurantRequest {
    pub name: Option<String>,
    pub country: Option<String>,
    pub full_address: Option<String>,
    pub cuisine: Option<String>,
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct RestaurantResponse {
    pub restaurant: Restaurant,
}

#[derive(Serialize)]
pub struct RestaurantList {
    pub restaurants: Vec<Restaurant>,
    pub metadata: Metadata,
}

// ==================== Category & Menu Types ====================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCategoryRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMenuRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price_cents: i64,
}

#[derive(Serialize)]
pub struct CategoryResponse {
    pub category: Category,
}

#[derive(Serialize)]
pub struct CategoryList {
    pub categories: Vec<Category>,
    pub metadata: Metadata,
}

#[derive(Serialize)]
pub struct MenuResponse {
    pub menu: Menu,
}

#[derive(Serialize)]
pub struct MenuList {
    pub menus: Vec<Menu>,
    pub metadata: Metadata,
}
