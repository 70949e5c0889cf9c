//! Menu listing

use axum::{
    Json, Router,
    extract::{Query, State},
    middleware::from_fn_with_state,
    routing::get,
};
use larder_auth::permissions::RESTAURANT_READ;
use larder_auth::{PermissionGate, require_permission};
use larder_db::MenuScope;

use crate::error::ApiError;
use crate::extract::ListQuery;
use crate::state::AppState;

use super::types::MenuList;

pub(super) const MENU_SORT: &[&str] = &[
    "id",
    "name",
    "price_cents",
    "is_available",
    "created_at",
    "-id",
    "-name",
    "-price_cents",
    "-is_available",
    "-created_at",
];

/// GET /v1/menus
async fn list_menus(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MenuList>, ApiError> {
    let filters = query.filters(MENU_SORT)?;
    let scope = MenuScope {
        name: query.name(),
        ..Default::default()
    };
    let (menus, metadata) = state.db.list_menus(scope, &filters).await?;
    Ok(Json(MenuList { menus, metadata }))
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let read = PermissionGate::new(state.permissions.clone(), RESTAURANT_READ);

    Router::new()
        .route("/v1/menus", get(list_menus))
        .route_layer(from_fn_with_state(read, require_permission))
}
