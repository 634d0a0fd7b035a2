//! Review repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use markets_core::{Rating, ReviewId, StoreId, UserId};

use super::{RepositoryError, write_error};
use crate::models::{Review, ReviewWithAuthor};

/// Internal row type for `PostgreSQL` review queries.
#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: ReviewId,
    text: String,
    rating: Rating,
    author_id: UserId,
    store_id: StoreId,
    created_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            rating: row.rating,
            author_id: row.author_id,
            store_id: row.store_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReviewWithAuthorRow {
    #[sqlx(flatten)]
    review: ReviewRow,
    author_name: String,
}

/// Repository for review database operations.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a review.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the store or author doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        author_id: UserId,
        store_id: StoreId,
        text: &str,
        rating: Rating,
    ) -> Result<Review, RepositoryError> {
        let row = sqlx::query_as::<_, ReviewRow>(
            r"
            INSERT INTO markets.review (text, rating, author_id, store_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, text, rating, author_id, store_id, created_at
            ",
        )
        .bind(text)
        .bind(rating)
        .bind(author_id)
        .bind(store_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error(e, "review already exists"))?;

        Ok(row.into())
    }

    /// Reviews of a store with author names, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::Database` with a decode error if a stored
    /// rating is out of range.
    pub async fn list_for_store(
        &self,
        store_id: StoreId,
    ) -> Result<Vec<ReviewWithAuthor>, RepositoryError> {
        let rows = sqlx::query_as::<_, ReviewWithAuthorRow>(
            r"
            SELECT r.id, r.text, r.rating, r.author_id, r.store_id, r.created_at,
                   u.name AS author_name
            FROM markets.review r
            JOIN markets.user u ON u.id = r.author_id
            WHERE r.store_id = $1
            ORDER BY r.created_at DESC, r.id DESC
            ",
        )
        .bind(store_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ReviewWithAuthor {
                review: r.review.into(),
                author_name: r.author_name,
            })
            .collect())
    }
}
