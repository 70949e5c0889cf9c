//! Restaurant routes

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};
use larder_auth::permissions::{RESTAURANT_READ, RESTAURANT_WRITE};
use larder_auth::{ActiveUser, AuthError, PermissionGate, Validator, require_permission};
use larder_db::{
    DbError, MenuScope, NewRestaurant, Restaurant, RestaurantStatus, UpdateRestaurant, User,
};
use tracing::info;

use crate::error::ApiError;
use crate::extract::{Id, JsonBody, ListQuery};
use crate::state::AppState;

use super::categories::CATEGORY_SORT;
use super::menus::MENU_SORT;
use super::types::{
    CategoryList, CreateRestaurantRequest, MenuList, MessageResponse, RestaurantList,
    RestaurantResponse, UpdateRestaurantRequest,
};
use super::validate_text;

const RESTAURANT_SORT: &[&str] = &[
    "id",
    "name",
    "country",
    "cuisine",
    "status",
    "created_at",
    "-id",
    "-name",
    "-country",
    "-cuisine",
    "-status",
    "-created_at",
];

const DUPLICATE_NAME: &str = "a restaurant with this name already exists";

fn validate_name(v: &mut Validator, value: &str) {
    validate_text(v, "name", value, 3, 50);
}

fn validate_country(v: &mut Validator, value: &str) {
    validate_text(v, "country", value, 3, 50);
}

fn validate_full_address(v: &mut Validator, value: &str) {
    validate_text(v, "full_address", value, 10, 200);
}

fn validate_cuisine(v: &mut Validator, value: &str) {
    validate_text(v, "cuisine", value, 3, 50);
}

fn read_status(v: &mut Validator, value: &str) -> Option<RestaurantStatus> {
    match value.parse() {
        Ok(status) => Some(status),
        Err(_) => {
            v.add_error("status", "must be either open or closed");
            None
        }
    }
}

fn restaurant_conflict(err: DbError) -> ApiError {
    let column = err.duplicate_field().map(str::to_string);
    match column.as_deref() {
        Some("owner_id") => ApiError::Conflict("you already own a restaurant".to_string()),
        Some("name") => ApiError::field("name", DUPLICATE_NAME),
        _ => err.into(),
    }
}

async fn find_restaurant(state: &AppState, id: i64) -> Result<Restaurant, ApiError> {
    state.db.get_restaurant(id).await?.ok_or(ApiError::NotFound)
}

/// Mutations are reserved for the restaurant's owner
fn ensure_owner(restaurant: &Restaurant, caller: &User) -> Result<(), ApiError> {
    if restaurant.owner_id != Some(caller.id) {
        return Err(AuthError::NotPermitted.into());
    }
    Ok(())
}

// ==================== Restaurant Routes ====================

/// GET /v1/restaurants
async fn list_restaurants(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<RestaurantList>, ApiError> {
    let filters = query.filters(RESTAURANT_SORT)?;
    let (restaurants, metadata) = state.db.list_restaurants(query.name(), &filters).await?;
    Ok(Json(RestaurantList {
        restaurants,
        metadata,
    }))
}

/// POST /v1/restaurants
async fn create_restaurant(
    ActiveUser(caller): ActiveUser,
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CreateRestaurantRequest>,
) -> Result<(StatusCode, Json<RestaurantResponse>), ApiError> {
    let mut v = Validator::new();
    validate_name(&mut v, &input.name);
    validate_country(&mut v, &input.country);
    validate_full_address(&mut v, &input.full_address);
    validate_cuisine(&mut v, &input.cuisine);
    let status = read_status(&mut v, input.status.as_deref().unwrap_or("open"));
    if !v.is_valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    let restaurant = state
        .db
        .insert_restaurant(NewRestaurant {
            owner_id: caller.id,
            name: input.name,
            country: input.country,
            full_address: input.full_address,
            cuisine: input.cuisine,
            status: status.unwrap_or(RestaurantStatus::Open),
        })
        .await
        .map_err(restaurant_conflict)?;

    // The cached snapshot still says the owner has no restaurant
    state.sessions.invalidate_user(caller.id).await;

    info!(
        restaurant_id = restaurant.id,
        user_id = caller.id,
        "Created restaurant"
    );
    Ok((StatusCode::CREATED, Json(RestaurantResponse { restaurant })))
}

/// GET /v1/restaurants/{id}
async fn show_restaurant(
    State(state): State<AppState>,
    Id(id): Id,
) -> Result<Json<RestaurantResponse>, ApiError> {
    let restaurant = find_restaurant(&state, id).await?;
    Ok(Json(RestaurantResponse { restaurant }))
}

/// PATCH /v1/restaurants/{id}
async fn update_restaurant(
    ActiveUser(caller): ActiveUser,
    State(state): State<AppState>,
    Id(id): Id,
    JsonBody(input): JsonBody<UpdateRestaurantRequest>,
) -> Result<Json<RestaurantResponse>, ApiError> {
    let restaurant = find_restaurant(&state, id).await?;
    ensure_owner(&restaurant, &caller)?;

    let mut v = Validator::new();
    if let Some(name) = &input.name {
        validate_name(&mut v, name);
    }
    if let Some(country) = &input.country {
        validate_country(&mut v, country);
    }
    if let Some(full_address) = &input.full_address {
        validate_full_address(&mut v, full_address);
    }
    if let Some(cuisine) = &input.cuisine {
        validate_cuisine(&mut v, cuisine);
    }
    let status = input
        .status
        .as_deref()
        .and_then(|s| read_status(&mut v, s));
    if !v.is_valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    let update = UpdateRestaurant {
        name: input.name,
        country: input.country,
        full_address: input.full_address,
        cuisine: input.cuisine,
        status,
    };
    if !state
        .db
        .update_restaurant(id, update)
        .await
        .map_err(restaurant_conflict)?
    {
        return Err(ApiError::NotFound);
    }

    let restaurant = find_restaurant(&state, id).await?;
    info!(restaurant_id = id, "Updated restaurant");
    Ok(Json(RestaurantResponse { restaurant }))
}

/// DELETE /v1/restaurants/{id}
async fn delete_restaurant(
    ActiveUser(caller): ActiveUser,
    State(state): State<AppState>,
    Id(id): Id,
) -> Result<Json<MessageResponse>, ApiError> {
    let restaurant = find_restaurant(&state, id).await?;
    ensure_owner(&restaurant, &caller)?;

    if !state.db.delete_restaurant(id).await? {
        return Err(ApiError::NotFound);
    }
    state.sessions.invalidate_user(caller.id).await;

    info!(restaurant_id = id, "Deleted restaurant");
    Ok(Json(MessageResponse {
        message: "restaurant successfully deleted",
    }))
}

/// GET /v1/restaurants/{id}/categories
async fn list_restaurant_categories(
    State(state): State<AppState>,
    Id(id): Id,
    Query(query): Query<ListQuery>,
) -> Result<Json<CategoryList>, ApiError> {
    let filters = query.filters(CATEGORY_SORT)?;
    find_restaurant(&state, id).await?;

    let (categories, metadata) = state
        .db
        .list_categories(Some(id), query.name(), &filters)
        .await?;
    Ok(Json(CategoryList {
        categories,
        metadata,
    }))
}

/// GET /v1/restaurants/{id}/menus
async fn list_restaurant_menus(
    State(state): State<AppState>,
    Id(id): Id,
    Query(query): Query<ListQuery>,
) -> Result<Json<MenuList>, ApiError> {
    let filters = query.filters(MENU_SORT)?;
    find_restaurant(&state, id).await?;

    let scope = MenuScope {
        restaurant_id: Some(id),
        name: query.name(),
        ..Default::default()
    };
    let (menus, metadata) = state.db.list_menus(scope, &filters).await?;
    Ok(Json(MenuList { menus, metadata }))
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let read = PermissionGate::new(state.permissions.clone(), RESTAURANT_READ);
    let write = PermissionGate::new(state.permissions.clone(), RESTAURANT_WRITE);

    let readers = Router::new()
        .route("/v1/restaurants", get(list_restaurants))
        .route("/v1/restaurants/{id}", get(show_restaurant))
        .route(
            "/v1/restaurants/{id}/categories",
            get(list_restaurant_categories),
        )
        .route("/v1/restaurants/{id}/menus", get(list_restaurant_menus))
        .route_layer(from_fn_with_state(read, require_permission));

    let writers = Router::new()
        .route("/v1/restaurants", post(create_restaurant))
        .route(
            "/v1/restaurants/{id}",
            patch(update_restaurant).delete(delete_restaurant),
        )
        .route_layer(from_fn_with_state(write, require_permission));

    readers.merge(writers)
}
