//! Category routes

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use larder_auth::permissions::{RESTAURANT_READ, RESTAURANT_WRITE};
use larder_auth::{ActiveUser, AuthError, PermissionGate, Validator, require_permission};
use larder_db::{Category, MenuScope, NewCategory, NewMenu};
use tracing::info;

use crate::error::ApiError;
use crate::extract::{Id, JsonBody, ListQuery};
use crate::state::AppState;

use super::menus::MENU_SORT;
use super::types::{
    CategoryList, CategoryResponse, CreateCategoryRequest, CreateMenuRequest, MenuList,
    MenuResponse,
};
use super::{on_duplicate, validate_text};

pub(super) const CATEGORY_SORT: &[&str] = &[
    "id",
    "name",
    "restaurant_id",
    "created_at",
    "-id",
    "-name",
    "-restaurant_id",
    "-created_at",
];

/// Upper bound on a menu price, in cents
const MAX_PRICE_CENTS: i64 = 100_000_000;

async fn find_category(state: &AppState, id: i64) -> Result<Category, ApiError> {
    state.db.get_category(id).await?.ok_or(ApiError::NotFound)
}

// ==================== Category Routes ====================

/// GET /v1/categories
async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<CategoryList>, ApiError> {
    let filters = query.filters(CATEGORY_SORT)?;
    let (categories, metadata) = state
        .db
        .list_categories(None, query.name(), &filters)
        .await?;
    Ok(Json(CategoryList {
        categories,
        metadata,
    }))
}

/// POST /v1/categories
///
/// Categories are always created in the caller's own restaurant.
async fn create_category(
    ActiveUser(caller): ActiveUser,
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiError> {
    let mut v = Validator::new();
    validate_text(&mut v, "name", &input.name, 2, 50);
    if !v.is_valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    let Some(restaurant) = state.db.get_restaurant_by_owner(caller.id).await? else {
        return Err(ApiError::field(
            "restaurant",
            "you must create a restaurant first",
        ));
    };

    let category = state
        .db
        .insert_category(NewCategory {
            restaurant_id: restaurant.id,
            name: input.name,
        })
        .await
        .map_err(|e| {
            on_duplicate(
                e,
                "name",
                ApiError::field("name", "this restaurant already has a category with this name"),
            )
        })?;

    info!(
        category_id = category.id,
        restaurant_id = restaurant.id,
        "Created category"
    );
    Ok((StatusCode::CREATED, Json(CategoryResponse { category })))
}

// ==================== Category Menu Routes ====================

/// GET /v1/categories/{id}/menus
async fn list_category_menus(
    State(state): State<AppState>,
    Id(id): Id,
    Query(query): Query<ListQuery>,
) -> Result<Json<MenuList>, ApiError> {
    let filters = query.filters(MENU_SORT)?;
    find_category(&state, id).await?;

    let scope = MenuScope {
        category_id: Some(id),
        name: query.name(),
        ..Default::default()
    };
    let (menus, metadata) = state.db.list_menus(scope, &filters).await?;
    Ok(Json(MenuList { menus, metadata }))
}

/// POST /v1/categories/{id}/menus
async fn create_menu(
    ActiveUser(caller): ActiveUser,
    State(state): State<AppState>,
    Id(id): Id,
    JsonBody(input): JsonBody<CreateMenuRequest>,
) -> Result<(StatusCode, Json<MenuResponse>), ApiError> {
    let category = find_category(&state, id).await?;
    let restaurant = state
        .db
        .get_restaurant(category.restaurant_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if restaurant.owner_id != Some(caller.id) {
        return Err(AuthError::NotPermitted.into());
    }

    let mut v = Validator::new();
    validate_text(&mut v, "name", &input.name, 2, 100);
    v.check(
        input.description.chars().count() <= 500,
        "description",
        "must not be more than 500 characters long",
    );
    v.check(input.price_cents > 0, "price_cents", "must be greater than zero");
    v.check(
        input.price_cents <= MAX_PRICE_CENTS,
        "price_cents",
        "must not be more than 100000000",
    );
    if !v.is_valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    let menu = state
        .db
        .insert_menu(NewMenu {
            category_id: category.id,
            name: input.name,
            description: input.description,
            price_cents: input.price_cents,
        })
        .await?;

    info!(menu_id = menu.id, category_id = category.id, "Created menu item");
    Ok((StatusCode::CREATED, Json(MenuResponse { menu })))
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let read = PermissionGate::new(state.permissions.clone(), RESTAURANT_READ);
    let write = PermissionGate::new(state.permissions.clone(), RESTAURANT_WRITE);

    let readers = Router::new()
        .route("/v1/categories", get(list_categories))
        .route("/v1/categories/{id}/menus", get(list_category_menus))
        .route_layer(from_fn_with_state(read, require_permission));

    let writers = Router::new()
        .route("/v1/categories", post(create_category))
        .route("/v1/categories/{id}/menus", post(create_menu))
        .route_layer(from_fn_with_state(write, require_permission));

    readers.merge(writers)
}
