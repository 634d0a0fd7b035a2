//! Store repository: CRUD, listing, tag aggregation, ranking and search.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use markets_core::{Slug, StoreId, UserId};

use super::{RepositoryError, write_error};
use crate::models::{Location, NearbyStore, Store, StoreDraft, TagCount, TopStore};

/// Columns selected for every store query, qualified with the `s` alias.
const STORE_COLUMNS: &str = "s.id, s.name, s.slug, s.description, s.tags, \
     s.location_lng, s.location_lat, s.address, s.photo, s.author_id, s.created_at";

/// Mean Earth radius used for great-circle distances.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Internal row type for `PostgreSQL` store queries.
#[derive(Debug, sqlx::FromRow)]
struct StoreRow {
    id: StoreId,
    name: String,
    slug: Slug,
    description: Option<String>,
    tags: Vec<String>,
    location_lng: f64,
    location_lat: f64,
    address: String,
    photo: Option<String>,
    author_id: UserId,
    created_at: DateTime<Utc>,
}

impl From<StoreRow> for Store {
    fn from(row: StoreRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            tags: row.tags,
            location: Location {
                lng: row.location_lng,
                lat: row.location_lat,
                address: row.address,
            },
            photo: row.photo,
            author_id: row.author_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TopStoreRow {
    #[sqlx(flatten)]
    store: StoreRow,
    average_rating: f64,
    review_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct NearbyStoreRow {
    #[sqlx(flatten)]
    store: StoreRow,
    distance_km: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct TagCountRow {
    tag: String,
    count: i64,
}

/// Repository for store database operations.
pub struct StoreRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> StoreRepository<'a> {
    /// Create a new store repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a store owned by `author_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the author doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        author_id: UserId,
        slug: &Slug,
        draft: &StoreDraft,
    ) -> Result<Store, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO markets.store AS s
                (name, slug, description, tags, location_lng, location_lat, address, photo, author_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {STORE_COLUMNS}
            "
        );

        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(&draft.name)
            .bind(slug)
            .bind(draft.description.as_deref())
            .bind(&draft.tags)
            .bind(draft.location.lng)
            .bind(draft.location.lat)
            .bind(&draft.location.address)
            .bind(draft.photo.as_deref())
            .bind(author_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| write_error(e, "store already exists"))?;

        Ok(row.into())
    }

    /// Overwrite a store's editable fields and slug.
    ///
    /// A `None` photo keeps the existing one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the store doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn update(
        &self,
        id: StoreId,
        slug: &Slug,
        draft: &StoreDraft,
    ) -> Result<Store, RepositoryError> {
        let sql = format!(
            r"
            UPDATE markets.store AS s
            SET name = $2,
                slug = $3,
                description = $4,
                tags = $5,
                location_lng = $6,
                location_lat = $7,
                address = $8,
                photo = COALESCE($9, s.photo)
            WHERE s.id = $1
            RETURNING {STORE_COLUMNS}
            "
        );

        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(id)
            .bind(&draft.name)
            .bind(slug)
            .bind(draft.description.as_deref())
            .bind(&draft.tags)
            .bind(draft.location.lng)
            .bind(draft.location.lat)
            .bind(&draft.location.address)
            .bind(draft.photo.as_deref())
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// Get a store by its ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM markets.store s WHERE s.id = $1");

        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Store::from))
    }

    /// Get a store by its slug.
    ///
    /// Slugs are not constrained unique; if two stores raced to the same slug
    /// the older one wins.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {STORE_COLUMNS}
            FROM markets.store s
            WHERE s.slug = $1
            ORDER BY s.created_at ASC, s.id ASC
            LIMIT 1
            "
        );

        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(slug)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Store::from))
    }

    /// Slugs matching a case-insensitive `PostgreSQL` regex.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn slugs_matching(
        &self,
        pattern: &str,
    ) -> Result<Vec<String>, RepositoryError> {
        let slugs = sqlx::query_scalar::<_, String>(
            r"
            SELECT slug
            FROM markets.store
            WHERE slug ~* $1
            ",
        )
        .bind(pattern)
        .fetch_all(self.pool)
        .await?;

        Ok(slugs)
    }

    /// Stores newest first, for one page of the listing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Store>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {STORE_COLUMNS}
            FROM markets.store s
            ORDER BY s.created_at DESC, s.id DESC
            LIMIT $1 OFFSET $2
            "
        );

        let rows = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Store::from).collect())
    }

    /// Total number of stores.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM markets.store")
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }

    /// Histogram of tags across all stores, most used first, ties by tag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn tag_counts(&self) -> Result<Vec<TagCount>, RepositoryError> {
        let rows = sqlx::query_as::<_, TagCountRow>(
            r"
            SELECT tag, COUNT(*) AS count
            FROM markets.store s, UNNEST(s.tags) AS tag
            GROUP BY tag
            ORDER BY count DESC, tag ASC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| TagCount {
                tag: r.tag,
                count: r.count,
            })
            .collect())
    }

    /// Stores carrying `tag`, or every store with at least one tag when `tag`
    /// is `None`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Store>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {STORE_COLUMNS}
            FROM markets.store s
            WHERE ($1::TEXT IS NULL AND CARDINALITY(s.tags) > 0)
               OR $1 = ANY(s.tags)
            ORDER BY s.created_at DESC, s.id DESC
            "
        );

        let rows = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(tag)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Store::from).collect())
    }

    /// Stores with at least `min_reviews` reviews, highest mean rating first.
    ///
    /// Ties go to the older store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top_rated(
        &self,
        min_reviews: i64,
        limit: i64,
    ) -> Result<Vec<TopStore>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {STORE_COLUMNS},
                   AVG(r.rating)::DOUBLE PRECISION AS average_rating,
                   COUNT(r.id) AS review_count
            FROM markets.store s
            JOIN markets.review r ON r.store_id = s.id
            GROUP BY s.id
            HAVING COUNT(r.id) >= $1
            ORDER BY average_rating DESC, s.created_at ASC, s.id ASC
            LIMIT $2
            "
        );

        let rows = sqlx::query_as::<_, TopStoreRow>(&sql)
            .bind(min_reviews)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| TopStore {
                store: r.store.into(),
                average_rating: r.average_rating,
                review_count: r.review_count,
            })
            .collect())
    }

    /// Full-text search over name and description, best match first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<Store>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {STORE_COLUMNS}
            FROM markets.store s,
                 plainto_tsquery('english', $1) AS q
            WHERE to_tsvector('english', s.name || ' ' || COALESCE(s.description, '')) @@ q
            ORDER BY ts_rank(
                to_tsvector('english', s.name || ' ' || COALESCE(s.description, '')), q
            ) DESC, s.id ASC
            LIMIT $2
            "
        );

        let rows = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(query)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Store::from).collect())
    }

    /// Stores within `max_km` of a point, nearest first (haversine distance).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn near(
        &self,
        lng: f64,
        lat: f64,
        max_km: f64,
        limit: i64,
    ) -> Result<Vec<NearbyStore>, RepositoryError> {
        let sql = format!(
            r"
            SELECT *
            FROM (
                SELECT {STORE_COLUMNS},
                       2 * $5::DOUBLE PRECISION * ASIN(LEAST(1.0, SQRT(
                           POWER(SIN(RADIANS(s.location_lat - $2) / 2), 2)
                           + COS(RADIANS($2)) * COS(RADIANS(s.location_lat))
                             * POWER(SIN(RADIANS(s.location_lng - $1) / 2), 2)
                       ))) AS distance_km
                FROM markets.store s
            ) AS d
            WHERE d.distance_km <= $3
            ORDER BY d.distance_km ASC
            LIMIT $4
            "
        );

        let rows = sqlx::query_as::<_, NearbyStoreRow>(&sql)
            .bind(lng)
            .bind(lat)
            .bind(max_km)
            .bind(limit)
            .bind(EARTH_RADIUS_KM)
            .fetch_all(self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| NearbyStore {
                store: r.store.into(),
                distance_km: r.distance_km,
            })
            .collect())
    }

    /// Stores hearted by a user, most recently hearted first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn hearted_by(&self, user_id: UserId) -> Result<Vec<Store>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {STORE_COLUMNS}
            FROM markets.store s
            JOIN markets.user_heart h ON h.store_id = s.id
            WHERE h.user_id = $1
            ORDER BY h.created_at DESC
            "
        );

        let rows = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Store::from).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use markets_core::{Email, Rating, compute_slug, slug_family_pattern, slugify};

    use super::*;
    use crate::db::{HeartRepository, ReviewRepository, UserRepository};

    async fn user(pool: &PgPool, email: &str) -> UserId {
        UserRepository::new(pool)
            .create(&Email::parse(email).unwrap(), "Tester", "not-a-real-hash")
            .await
            .unwrap()
            .id
    }

    fn draft(name: &str, tags: &[&str], lng: f64, lat: f64) -> StoreDraft {
        StoreDraft {
            name: name.to_owned(),
            description: None,
            tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            location: Location {
                lng,
                lat,
                address: "1 Main St".to_owned(),
            },
            photo: None,
        }
    }

    async fn insert(
        repo: &StoreRepository<'_>,
        author: UserId,
        name: &str,
        tags: &[&str],
    ) -> Store {
        let base = slugify(name);
        let existing = repo
            .slugs_matching(&slug_family_pattern(&base))
            .await
            .unwrap();
        let slug = compute_slug(name, &existing);
        repo.create(author, &slug, &draft(name, tags, -79.87, 43.25))
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires DATABASE_URL"]
    async fn test_slug_family_sequence(pool: PgPool) {
        let author = user(&pool, "slugs@example.com").await;
        let repo = StoreRepository::new(&pool);

        let first = insert(&repo, author, "Cafe Bloom", &[]).await;
        let second = insert(&repo, author, "Cafe Bloom", &[]).await;
        insert(&repo, author, "Cafe Bloomers", &[]).await;
        let third = insert(&repo, author, "Cafe Bloom", &[]).await;

        assert_eq!(first.slug.as_str(), "cafe-bloom");
        assert_eq!(second.slug.as_str(), "cafe-bloom-2");
        assert_eq!(third.slug.as_str(), "cafe-bloom-3");

        let family = repo
            .slugs_matching(&slug_family_pattern(&first.slug))
            .await
            .unwrap();
        assert_eq!(family.len(), 3);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires DATABASE_URL"]
    async fn test_tag_counts_order(pool: PgPool) {
        let author = user(&pool, "tags@example.com").await;
        let repo = StoreRepository::new(&pool);

        insert(&repo, author, "One", &["Wifi", "Vegan"]).await;
        insert(&repo, author, "Two", &["Wifi", "Licensed"]).await;
        insert(&repo, author, "Three", &[]).await;

        let counts = repo.tag_counts().await.unwrap();
        let counts: Vec<(&str, i64)> = counts.iter().map(|c| (c.tag.as_str(), c.count)).collect();
        assert_eq!(counts, [("Wifi", 2), ("Licensed", 1), ("Vegan", 1)]);

        let total: i64 = counts.iter().map(|(_, n)| n).sum();
        let occurrences: usize = repo
            .list_by_tag(None)
            .await
            .unwrap()
            .iter()
            .map(|s| s.tags.len())
            .sum();
        assert_eq!(usize::try_from(total).unwrap(), occurrences);

        assert_eq!(repo.list_by_tag(None).await.unwrap().len(), 2);
        assert_eq!(repo.list_by_tag(Some("Vegan")).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires DATABASE_URL"]
    async fn test_top_rated_requires_two_reviews(pool: PgPool) {
        let author = user(&pool, "top@example.com").await;
        let repo = StoreRepository::new(&pool);
        let reviews = ReviewRepository::new(&pool);

        let good = insert(&repo, author, "Good", &[]).await;
        let great = insert(&repo, author, "Great", &[]).await;
        let lonely = insert(&repo, author, "Lonely", &[]).await;

        for (store, rating) in [(&good, 4), (&good, 3), (&great, 5), (&great, 4), (&lonely, 5)] {
            reviews
                .create(author, store.id, "Review", Rating::new(rating).unwrap())
                .await
                .unwrap();
        }

        let top = repo.top_rated(2, 10).await.unwrap();
        let ids: Vec<StoreId> = top.iter().map(|t| t.store.id).collect();
        assert_eq!(ids, [great.id, good.id]);
        assert!((top.first().unwrap().average_rating - 4.5).abs() < f64::EPSILON);
        assert_eq!(top.first().unwrap().review_count, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires DATABASE_URL"]
    async fn test_top_rated_limit_and_tie_order(pool: PgPool) {
        let author = user(&pool, "ties@example.com").await;
        let repo = StoreRepository::new(&pool);
        let reviews = ReviewRepository::new(&pool);
        let four = Rating::new(4).unwrap();

        let mut tied = Vec::new();
        for i in 0..12 {
            let store = insert(&repo, author, &format!("Tied {i}"), &[]).await;
            for _ in 0..2 {
                reviews.create(author, store.id, "Fine", four).await.unwrap();
            }
            tied.push(store.id);
        }
        let best = insert(&repo, author, "Best", &[]).await;
        for _ in 0..2 {
            reviews
                .create(author, best.id, "Superb", Rating::new(5).unwrap())
                .await
                .unwrap();
        }

        let top = repo.top_rated(2, 10).await.unwrap();
        assert_eq!(top.len(), 10);

        let ids: Vec<StoreId> = top.iter().map(|t| t.store.id).collect();
        let mut expected = vec![best.id];
        expected.extend_from_slice(tied.get(..9).unwrap());
        assert_eq!(ids, expected);
        assert!(top.iter().skip(1).all(|t| (t.average_rating - 4.0).abs() < f64::EPSILON));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires DATABASE_URL"]
    async fn test_near_filters_by_distance(pool: PgPool) {
        let author = user(&pool, "near@example.com").await;
        let repo = StoreRepository::new(&pool);

        let here = repo
            .create(author, &slugify("Here"), &draft("Here", &[], -79.8711, 43.2557))
            .await
            .unwrap();
        repo.create(author, &slugify("Toronto"), &draft("Toronto", &[], -79.3832, 43.6532))
            .await
            .unwrap();

        let nearby = repo.near(-79.8700, 43.2560, 10.0, 10).await.unwrap();
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby.first().unwrap().store.id, here.id);
        assert!(nearby.first().unwrap().distance_km < 1.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires DATABASE_URL"]
    async fn test_heart_toggle_and_missing_store(pool: PgPool) {
        let author = user(&pool, "hearts@example.com").await;
        let repo = StoreRepository::new(&pool);
        let hearts = HeartRepository::new(&pool);
        let store = insert(&repo, author, "Loved", &[]).await;

        assert_eq!(hearts.toggle(author, store.id).await.unwrap(), [store.id]);
        assert_eq!(repo.hearted_by(author).await.unwrap().len(), 1);
        assert!(hearts.toggle(author, store.id).await.unwrap().is_empty());

        let missing = hearts.toggle(author, StoreId::new(i32::MAX)).await;
        assert!(matches!(missing, Err(RepositoryError::NotFound)));
    }
}
