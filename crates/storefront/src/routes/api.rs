//! JSON API handlers used by the type-ahead search and the map.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::error::Result;
use crate::models::{NearbyStore, Store};
use crate::services::stores::StoreService;
use crate::state::AppState;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Map query parameters.
#[derive(Debug, Deserialize)]
pub struct NearQuery {
    pub lng: f64,
    pub lat: f64,
}

/// Full-text store search.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Store>>> {
    let stores = StoreService::new(state.pool()).search(&query.q).await?;
    Ok(Json(stores))
}

/// Stores near a point.
pub async fn near(
    State(state): State<AppState>,
    Query(query): Query<NearQuery>,
) -> Result<Json<Vec<NearbyStore>>> {
    let stores = StoreService::new(state.pool())
        .near(query.lng, query.lat)
        .await?;
    Ok(Json(stores))
}
