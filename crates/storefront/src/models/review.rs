//! Review domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use markets_core::{Rating, ReviewId, StoreId, UserId};

/// A review left by a user on a store.
#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub id: ReviewId,
    pub text: String,
    pub rating: Rating,
    pub author_id: UserId,
    pub store_id: StoreId,
    pub created_at: DateTime<Utc>,
}

/// A review together with its author's display name, as shown on a store page.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewWithAuthor {
    #[serde(flatten)]
    pub review: Review,
    pub author_name: String,
}
