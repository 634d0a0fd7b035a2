//! Heart (favorite) repository.

use sqlx::PgPool;

use markets_core::{StoreId, UserId};

use super::{RepositoryError, write_error};

/// Repository for the `user_heart` join table.
pub struct HeartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> HeartRepository<'a> {
    /// Create a new heart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Heart the store if it isn't hearted, otherwise un-heart it.
    ///
    /// Returns the user's hearted store IDs after the change.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the store doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn toggle(
        &self,
        user_id: UserId,
        store_id: StoreId,
    ) -> Result<Vec<StoreId>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            r"
            DELETE FROM markets.user_heart
            WHERE user_id = $1 AND store_id = $2
            ",
        )
        .bind(user_id)
        .bind(store_id)
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() == 0 {
            sqlx::query(
                r"
                INSERT INTO markets.user_heart (user_id, store_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(user_id)
            .bind(store_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error(e, "already hearted"))?;
        }

        let hearts = sqlx::query_scalar::<_, StoreId>(
            r"
            SELECT store_id
            FROM markets.user_heart
            WHERE user_id = $1
            ORDER BY created_at ASC
            ",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(hearts)
    }

    /// IDs of the stores a user has hearted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_ids(&self, user_id: UserId) -> Result<Vec<StoreId>, RepositoryError> {
        let hearts = sqlx::query_scalar::<_, StoreId>(
            r"
            SELECT store_id
            FROM markets.user_heart
            WHERE user_id = $1
            ORDER BY created_at ASC
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(hearts)
    }
}
