//! Store domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use markets_core::{Slug, StoreId, UserId};

use super::ReviewWithAuthor;

/// A store's position and street address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Longitude in degrees, `-180..=180`.
    pub lng: f64,
    /// Latitude in degrees, `-90..=90`.
    pub lat: f64,
    pub address: String,
}

impl Location {
    /// Whether the coordinates are finite and inside the valid ranges.
    #[must_use]
    pub fn has_valid_coordinates(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

/// A store listed in the directory.
#[derive(Debug, Clone, Serialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub slug: Slug,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub location: Location,
    /// File name of the resized photo inside the upload directory.
    pub photo: Option<String>,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Validated store fields for a create or update.
///
/// Built by [`crate::services::stores::StoreService`] from user input; the slug
/// is derived separately.
#[derive(Debug, Clone)]
pub struct StoreDraft {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub location: Location,
    pub photo: Option<String>,
}

/// Id and display name of a store's author.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorSummary {
    pub id: UserId,
    pub name: String,
}

/// A store with its author and reviews (newest first).
#[derive(Debug, Clone, Serialize)]
pub struct StoreDetail {
    #[serde(flatten)]
    pub store: Store,
    pub author: AuthorSummary,
    pub reviews: Vec<ReviewWithAuthor>,
}

/// One page of the store listing.
#[derive(Debug, Clone, Serialize)]
pub struct StorePage {
    pub stores: Vec<Store>,
    /// 1-based page number.
    pub page: u32,
    /// Total number of pages (0 when there are no stores).
    pub pages: u32,
    /// Total number of stores.
    pub count: i64,
}

/// Number of stores carrying a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

/// A store ranked by its average review rating.
#[derive(Debug, Clone, Serialize)]
pub struct TopStore {
    #[serde(flatten)]
    pub store: Store,
    pub average_rating: f64,
    pub review_count: i64,
}

/// A store near a point, with its great-circle distance.
#[derive(Debug, Clone, Serialize)]
pub struct NearbyStore {
    #[serde(flatten)]
    pub store: Store,
    pub distance_km: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(lng: f64, lat: f64) -> Location {
        Location {
            lng,
            lat,
            address: "1 Main St".to_owned(),
        }
    }

    #[test]
    fn test_location_coordinate_ranges() {
        assert!(location(-79.38, 43.65).has_valid_coordinates());
        assert!(location(180.0, -90.0).has_valid_coordinates());
        assert!(!location(181.0, 0.0).has_valid_coordinates());
        assert!(!location(0.0, 90.5).has_valid_coordinates());
        assert!(!location(f64::NAN, 0.0).has_valid_coordinates());
    }
}
