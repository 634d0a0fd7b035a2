//! Heart (favorite) route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use markets_core::StoreId;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::Store;
use crate::services::stores::StoreService;
use crate::state::AppState;

/// The user's hearted store IDs after a toggle.
#[derive(Debug, Serialize)]
pub struct HeartsResponse {
    pub hearts: Vec<StoreId>,
}

/// Stores the logged-in user has hearted.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Store>>> {
    let stores = StoreService::new(state.pool())
        .hearted_stores(user.id)
        .await?;
    Ok(Json(stores))
}

/// Heart or un-heart a store.
pub async fn toggle(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<i32>,
) -> Result<Json<HeartsResponse>> {
    let hearts = StoreService::new(state.pool())
        .toggle_heart(user.id, StoreId::new(store_id))
        .await?;
    Ok(Json(HeartsResponse { hearts }))
}
