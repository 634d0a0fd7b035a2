//! Tag route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use crate::error::Result;
use crate::models::{Store, TagCount};
use crate::services::stores::StoreService;
use crate::state::AppState;

/// Tag histogram and the matching stores.
#[derive(Debug, Serialize)]
pub struct TagsResponse {
    /// Selected tag, if any.
    pub tag: Option<String>,
    pub tags: Vec<TagCount>,
    pub stores: Vec<Store>,
}

async fn tags_response(state: &AppState, tag: Option<String>) -> Result<Json<TagsResponse>> {
    let (tags, stores) = StoreService::new(state.pool())
        .tags(tag.as_deref())
        .await?;
    Ok(Json(TagsResponse { tag, tags, stores }))
}

/// All tags, with every tagged store.
pub async fn index(State(state): State<AppState>) -> Result<Json<TagsResponse>> {
    tags_response(&state, None).await
}

/// All tags, with the stores carrying `tag`.
pub async fn show(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<TagsResponse>> {
    tags_response(&state, Some(tag)).await
}
