//! Store service: slugs, ownership, listing, tags, rankings, reviews and hearts.

use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;

use markets_core::{
    Rating, RatingError, StoreId, UserId, compute_slug, rename_slug, slug_family_pattern, slugify,
};

use crate::db::{
    HeartRepository, RepositoryError, ReviewRepository, StoreRepository, UserRepository,
};
use crate::models::{
    AuthorSummary, Location, NearbyStore, Review, Store, StoreDetail, StoreDraft, StorePage,
    TagCount, TopStore,
};

/// Stores per listing page.
pub const STORES_PER_PAGE: u32 = 4;

/// Minimum reviews for a store to be ranked.
pub const TOP_MIN_REVIEWS: i64 = 2;

/// Maximum number of ranked stores.
pub const TOP_LIMIT: i64 = 10;

/// Maximum search results.
pub const SEARCH_LIMIT: i64 = 10;

/// Radius for nearby stores.
pub const NEAR_MAX_KM: f64 = 10.0;

/// Maximum nearby stores.
pub const NEAR_LIMIT: i64 = 10;

/// Message returned when a user edits a store they don't own.
pub const NOT_OWNER_MESSAGE: &str = "You must own a store in order to edit it!";

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// Rating out of range.
    #[error(transparent)]
    Rating(#[from] RatingError),

    /// Store does not exist.
    #[error("store not found")]
    NotFound,

    /// The user is not the store's author.
    #[error("{NOT_OWNER_MESSAGE}")]
    NotOwner,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for StoreError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Repository(other),
        }
    }
}

/// Store fields as submitted by a user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub lng: Option<f64>,
    pub lat: Option<f64>,
    #[serde(default)]
    pub address: String,
}

impl StoreInput {
    /// Normalize and validate the input.
    ///
    /// Trims text, drops an empty description, removes blank and duplicate
    /// tags (keeping first-seen order) and requires a name, an address and
    /// in-range coordinates.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` naming the first invalid field.
    pub fn into_draft(self, photo: Option<String>) -> Result<StoreDraft, StoreError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(StoreError::Validation("Please enter a store name!".to_owned()));
        }

        let description = self
            .description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in self.tags {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_owned());
            }
        }

        let address = self.address.trim().to_owned();
        if address.is_empty() {
            return Err(StoreError::Validation("You must supply an address!".to_owned()));
        }

        let (Some(lng), Some(lat)) = (self.lng, self.lat) else {
            return Err(StoreError::Validation(
                "You must supply coordinates!".to_owned(),
            ));
        };
        let location = Location { lng, lat, address };
        if !location.has_valid_coordinates() {
            return Err(StoreError::Validation(
                "Coordinates are out of range!".to_owned(),
            ));
        }

        Ok(StoreDraft {
            name,
            description,
            tags,
            location,
            photo,
        })
    }
}

/// Review fields as submitted by a user.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewInput {
    pub text: String,
    pub rating: i64,
}

/// Outcome of a listing request.
#[derive(Debug)]
pub enum PageOutcome {
    /// The requested page.
    Page(StorePage),
    /// The page is past the end; go to this (last) page instead.
    RedirectTo(u32),
}

/// Fail unless `user_id` authored `store`.
///
/// # Errors
///
/// Returns `StoreError::NotOwner` otherwise.
pub fn ensure_owner(store: &Store, user_id: UserId) -> Result<(), StoreError> {
    if store.author_id == user_id {
        Ok(())
    } else {
        Err(StoreError::NotOwner)
    }
}

/// Number of pages needed for `count` stores.
#[must_use]
pub fn page_count(count: i64) -> u32 {
    let count = u64::try_from(count).unwrap_or(0);
    let pages = count.div_ceil(u64::from(STORES_PER_PAGE));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Store service.
pub struct StoreService<'a> {
    stores: StoreRepository<'a>,
    reviews: ReviewRepository<'a>,
    hearts: HeartRepository<'a>,
    users: UserRepository<'a>,
}

impl<'a> StoreService<'a> {
    /// Create a new store service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            stores: StoreRepository::new(pool),
            reviews: ReviewRepository::new(pool),
            hearts: HeartRepository::new(pool),
            users: UserRepository::new(pool),
        }
    }

    /// Slugs already in use in the family of `name`.
    async fn slug_family(&self, name: &str) -> Result<Vec<String>, StoreError> {
        let pattern = slug_family_pattern(&slugify(name));
        Ok(self.stores.slugs_matching(&pattern).await?)
    }

    /// Create a store owned by `author_id`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the author no longer exists.
    pub async fn create(&self, author_id: UserId, draft: &StoreDraft) -> Result<Store, StoreError> {
        let existing = self.slug_family(&draft.name).await?;
        let slug = compute_slug(&draft.name, &existing);
        let store = self.stores.create(author_id, &slug, draft).await?;

        tracing::info!(store_id = %store.id, slug = %store.slug, "Store created");
        Ok(store)
    }

    /// Fetch a store for editing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the store doesn't exist.
    /// Returns `StoreError::NotOwner` if `user_id` is not the author.
    pub async fn get_for_edit(&self, user_id: UserId, id: StoreId) -> Result<Store, StoreError> {
        let store = self.stores.get_by_id(id).await?.ok_or(StoreError::NotFound)?;
        ensure_owner(&store, user_id)?;
        Ok(store)
    }

    /// Update a store. The slug is recomputed only when the name changes,
    /// and is kept if it already fits the new name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the store doesn't exist.
    /// Returns `StoreError::NotOwner` if `user_id` is not the author.
    pub async fn update(
        &self,
        user_id: UserId,
        id: StoreId,
        draft: &StoreDraft,
    ) -> Result<Store, StoreError> {
        let current = self.get_for_edit(user_id, id).await?;

        let slug = if draft.name == current.name {
            current.slug
        } else {
            let existing = self.slug_family(&draft.name).await?;
            rename_slug(&draft.name, &current.slug, &existing)
        };

        let store = self.stores.update(id, &slug, draft).await?;
        tracing::info!(store_id = %store.id, slug = %store.slug, "Store updated");
        Ok(store)
    }

    /// A store with its author and reviews.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for an unknown slug.
    pub async fn detail(&self, slug: &str) -> Result<StoreDetail, StoreError> {
        let store = self
            .stores
            .get_by_slug(slug)
            .await?
            .ok_or(StoreError::NotFound)?;

        let (author, reviews) = tokio::try_join!(
            self.users.get_by_id(store.author_id),
            self.reviews.list_for_store(store.id),
        )?;
        let author = author.ok_or_else(|| {
            StoreError::Repository(RepositoryError::DataCorruption(format!(
                "store {} has no author",
                store.id
            )))
        })?;

        Ok(StoreDetail {
            author: AuthorSummary {
                id: author.id,
                name: author.name,
            },
            store,
            reviews,
        })
    }

    /// One page of the listing, newest first. Page numbers start at 1.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if a query fails.
    pub async fn page(&self, page: u32) -> Result<PageOutcome, StoreError> {
        let page = page.max(1);
        let limit = i64::from(STORES_PER_PAGE);
        let offset = i64::from(page - 1) * limit;

        let (stores, count) =
            tokio::try_join!(self.stores.list(limit, offset), self.stores.count())?;
        let pages = page_count(count);

        if stores.is_empty() && pages > 0 && page > pages {
            tracing::info!(page, pages, "Requested page past the end");
            return Ok(PageOutcome::RedirectTo(pages));
        }

        Ok(PageOutcome::Page(StorePage {
            stores,
            page,
            pages,
            count,
        }))
    }

    /// Tag histogram plus the stores carrying `tag` (any tag when `None`).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if a query fails.
    pub async fn tags(
        &self,
        tag: Option<&str>,
    ) -> Result<(Vec<TagCount>, Vec<Store>), StoreError> {
        let (tags, stores) =
            tokio::try_join!(self.stores.tag_counts(), self.stores.list_by_tag(tag))?;
        Ok((tags, stores))
    }

    /// Highest rated stores with enough reviews.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if the query fails.
    pub async fn top(&self) -> Result<Vec<TopStore>, StoreError> {
        Ok(self.stores.top_rated(TOP_MIN_REVIEWS, TOP_LIMIT).await?)
    }

    /// Full-text search. A blank query matches nothing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if the query fails.
    pub async fn search(&self, query: &str) -> Result<Vec<Store>, StoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.stores.search(query, SEARCH_LIMIT).await?)
    }

    /// Stores near a point.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` for out-of-range coordinates.
    pub async fn near(&self, lng: f64, lat: f64) -> Result<Vec<NearbyStore>, StoreError> {
        let point = Location {
            lng,
            lat,
            address: String::new(),
        };
        if !point.has_valid_coordinates() {
            return Err(StoreError::Validation(
                "Coordinates are out of range!".to_owned(),
            ));
        }
        Ok(self
            .stores
            .near(lng, lat, NEAR_MAX_KM, NEAR_LIMIT)
            .await?)
    }

    /// Heart or un-heart a store; returns the user's hearted store IDs.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the store doesn't exist.
    pub async fn toggle_heart(
        &self,
        user_id: UserId,
        store_id: StoreId,
    ) -> Result<Vec<StoreId>, StoreError> {
        Ok(self.hearts.toggle(user_id, store_id).await?)
    }

    /// IDs of the stores a user has hearted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if the query fails.
    pub async fn heart_ids(&self, user_id: UserId) -> Result<Vec<StoreId>, StoreError> {
        Ok(self.hearts.list_ids(user_id).await?)
    }

    /// Stores a user has hearted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if the query fails.
    pub async fn hearted_stores(&self, user_id: UserId) -> Result<Vec<Store>, StoreError> {
        Ok(self.stores.hearted_by(user_id).await?)
    }

    /// Add a review to a store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` for blank text.
    /// Returns `StoreError::Rating` for a rating outside 1..=5.
    /// Returns `StoreError::NotFound` if the store doesn't exist.
    pub async fn add_review(
        &self,
        author_id: UserId,
        store_id: StoreId,
        input: &ReviewInput,
    ) -> Result<Review, StoreError> {
        let text = input.text.trim();
        if text.is_empty() {
            return Err(StoreError::Validation("Your review must have text!".to_owned()));
        }
        let rating = Rating::new(input.rating)?;

        let review = self
            .reviews
            .create(author_id, store_id, text, rating)
            .await?;
        tracing::info!(review_id = %review.id, store_id = %store_id, "Review added");
        Ok(review)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use markets_core::Email;

    use super::*;

    fn input() -> StoreInput {
        StoreInput {
            name: "  Cafe Bloom ".to_owned(),
            description: Some("  Flowers and coffee  ".to_owned()),
            tags: vec![
                "Wifi".to_owned(),
                " Vegan ".to_owned(),
                "Wifi".to_owned(),
                "  ".to_owned(),
            ],
            lng: Some(-79.38),
            lat: Some(43.65),
            address: " 1 Main St ".to_owned(),
        }
    }

    fn store_by(author: i32) -> Store {
        Store {
            id: StoreId::new(1),
            name: "Cafe Bloom".to_owned(),
            slug: slugify("Cafe Bloom"),
            description: None,
            tags: Vec::new(),
            location: Location {
                lng: 0.0,
                lat: 0.0,
                address: "1 Main St".to_owned(),
            },
            photo: None,
            author_id: UserId::new(author),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_into_draft_normalizes() {
        let draft = input().into_draft(Some("a.jpeg".to_owned())).unwrap();
        assert_eq!(draft.name, "Cafe Bloom");
        assert_eq!(draft.description.as_deref(), Some("Flowers and coffee"));
        assert_eq!(draft.tags, ["Wifi", "Vegan"]);
        assert_eq!(draft.location.address, "1 Main St");
        assert_eq!(draft.photo.as_deref(), Some("a.jpeg"));
    }

    #[test]
    fn test_into_draft_empty_description_is_none() {
        let mut input = input();
        input.description = Some("   ".to_owned());
        assert!(input.into_draft(None).unwrap().description.is_none());
    }

    #[test]
    fn test_into_draft_requires_fields() {
        let mut missing_name = input();
        missing_name.name = " ".to_owned();
        assert!(matches!(
            missing_name.into_draft(None),
            Err(StoreError::Validation(_))
        ));

        let mut missing_address = input();
        missing_address.address = String::new();
        assert!(matches!(
            missing_address.into_draft(None),
            Err(StoreError::Validation(_))
        ));

        let mut missing_lat = input();
        missing_lat.lat = None;
        assert!(matches!(
            missing_lat.into_draft(None),
            Err(StoreError::Validation(_))
        ));

        let mut bad_lng = input();
        bad_lng.lng = Some(200.0);
        assert!(matches!(
            bad_lng.into_draft(None),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_ensure_owner() {
        let store = store_by(1);
        assert!(ensure_owner(&store, UserId::new(1)).is_ok());

        let err = ensure_owner(&store, UserId::new(2)).unwrap_err();
        assert!(matches!(err, StoreError::NotOwner));
        assert_eq!(err.to_string(), NOT_OWNER_MESSAGE);
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0), 0);
        assert_eq!(page_count(1), 1);
        assert_eq!(page_count(4), 1);
        assert_eq!(page_count(5), 2);
        assert_eq!(page_count(-1), 0);
    }

    #[test]
    fn test_repository_not_found_maps_to_not_found() {
        assert!(matches!(
            StoreError::from(RepositoryError::NotFound),
            StoreError::NotFound
        ));
        assert!(matches!(
            StoreError::from(RepositoryError::Conflict("x".to_owned())),
            StoreError::Repository(_)
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires DATABASE_URL"]
    async fn test_rename_keeps_slugs_unique(pool: PgPool) {
        let author = UserRepository::new(&pool)
            .create(&Email::parse("rename@example.com").unwrap(), "Tester", "hash")
            .await
            .unwrap()
            .id;
        let service = StoreService::new(&pool);

        let first = service
            .create(author, &input().into_draft(None).unwrap())
            .await
            .unwrap();
        let second = service
            .create(author, &input().into_draft(None).unwrap())
            .await
            .unwrap();
        assert_eq!(first.slug.as_str(), "cafe-bloom");
        assert_eq!(second.slug.as_str(), "cafe-bloom-2");

        let mut renamed = input();
        renamed.name = "Cafe Bloom!".to_owned();
        let first = service
            .update(author, first.id, &renamed.into_draft(None).unwrap())
            .await
            .unwrap();
        assert_eq!(first.name, "Cafe Bloom!");
        assert_eq!(first.slug.as_str(), "cafe-bloom");

        let by_slug = service.detail("cafe-bloom-2").await.unwrap();
        assert_eq!(by_slug.store.id, second.id);

        let mut moved = input();
        moved.name = "Tea Room".to_owned();
        let first = service
            .update(author, first.id, &moved.into_draft(None).unwrap())
            .await
            .unwrap();
        assert_eq!(first.slug.as_str(), "tea-room");

        let mut back = input();
        back.name = "Cafe Bloom".to_owned();
        let first = service
            .update(author, first.id, &back.into_draft(None).unwrap())
            .await
            .unwrap();
        assert_eq!(first.slug.as_str(), "cafe-bloom-3");
        assert_eq!(service.detail("cafe-bloom-2").await.unwrap().store.id, second.id);
    }
}
