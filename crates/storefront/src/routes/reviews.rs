//! Review route handlers.

use axum::{
    Form, Json,
    extract::{Path, State},
    http::StatusCode,
};

use markets_core::StoreId;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::Review;
use crate::services::stores::{ReviewInput, StoreService};
use crate::state::AppState;

/// Add a review to a store as the logged-in user.
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<i32>,
    Form(input): Form<ReviewInput>,
) -> Result<(StatusCode, Json<Review>)> {
    let review = StoreService::new(state.pool())
        .add_review(user.id, StoreId::new(store_id), &input)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}
