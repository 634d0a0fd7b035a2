//! User repository for database operations.
//!
//! Accounts, password hashes and password reset tokens.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use markets_core::{Email, UserId};

use super::{RepositoryError, write_error};
use crate::models::User;

/// Internal row type for `PostgreSQL` user queries.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    email: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            email,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Row type for login lookups.
#[derive(Debug, sqlx::FromRow)]
struct UserWithHashRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, email, name, created_at, updated_at
            FROM markets.user
            WHERE email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, email, name, created_at, updated_at
            FROM markets.user
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Create a new user with a password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        email: &Email,
        name: &str,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO markets.user (email, name, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, name, created_at, updated_at
            ",
        )
        .bind(email.as_str())
        .bind(name)
        .bind(password_hash)
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error(e, "email already exists"))?;

        User::try_from(row)
    }

    /// Get a user and their password hash by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, UserWithHashRow>(
            r"
            SELECT id, email, name, created_at, updated_at, password_hash
            FROM markets.user
            WHERE email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        let user = User::try_from(r.user)?;
        Ok(Some((user, r.password_hash)))
    }

    /// Update a user's name and email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    /// Returns `RepositoryError::Conflict` if another account uses the email.
    pub async fn update_account(
        &self,
        id: UserId,
        email: &Email,
        name: &str,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            UPDATE markets.user
            SET email = $2, name = $3
            WHERE id = $1
            RETURNING id, email, name, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(email.as_str())
        .bind(name)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| write_error(e, "email already exists"))?
        .ok_or(RepositoryError::NotFound)?;

        User::try_from(row)
    }

    /// Store a password reset token for the account with this email.
    ///
    /// Returns the user if the email belongs to an account, `None` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_reset_token(
        &self,
        email: &Email,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            UPDATE markets.user
            SET reset_password_token = $2, reset_password_expires = $3
            WHERE email = $1
            RETURNING id, email, name, created_at, updated_at
            ",
        )
        .bind(email.as_str())
        .bind(token)
        .bind(expires_at)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Find the user holding an unexpired reset token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, email, name, created_at, updated_at
            FROM markets.user
            WHERE reset_password_token = $1
              AND reset_password_expires > $2
            ",
        )
        .bind(token)
        .bind(now)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Replace the password of the user holding an unexpired reset token and
    /// clear the token.
    ///
    /// The token is re-checked in the same statement, so a token can be used
    /// at most once. Returns `None` if no unexpired token matched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn reset_password(
        &self,
        token: &str,
        now: DateTime<Utc>,
        password_hash: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            UPDATE markets.user
            SET password_hash = $3,
                reset_password_token = NULL,
                reset_password_expires = NULL
            WHERE reset_password_token = $1
              AND reset_password_expires > $2
            RETURNING id, email, name, created_at, updated_at
            ",
        )
        .bind(token)
        .bind(now)
        .bind(password_hash)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn row(email: &str) -> UserRow {
        UserRow {
            id: 7,
            email: email.to_owned(),
            name: "Wes".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion() {
        let user = User::try_from(row("wes@example.com")).unwrap();
        assert_eq!(user.id, UserId::new(7));
        assert_eq!(user.email.as_str(), "wes@example.com");
        assert_eq!(user.name, "Wes");
    }

    #[test]
    fn test_row_conversion_rejects_corrupt_email() {
        let result = User::try_from(row("not-an-email"));
        assert!(matches!(result, Err(RepositoryError::DataCorruption(_))));
    }

    async fn account(pool: &PgPool, email: &str) -> Email {
        let email = Email::parse(email).unwrap();
        UserRepository::new(pool)
            .create(&email, "Tester", "old-hash")
            .await
            .unwrap();
        email
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires DATABASE_URL"]
    async fn test_expired_reset_token_is_rejected(pool: PgPool) {
        let email = account(&pool, "expired@example.com").await;
        let repo = UserRepository::new(&pool);

        let expired = Utc::now() - TimeDelta::seconds(1);
        assert!(repo.set_reset_token(&email, "tok", expired).await.unwrap().is_some());

        let now = Utc::now();
        assert!(repo.get_by_reset_token("tok", now).await.unwrap().is_none());
        assert!(repo.reset_password("tok", now, "new-hash").await.unwrap().is_none());

        let (_, hash) = repo.get_password_hash(&email).await.unwrap().unwrap();
        assert_eq!(hash, "old-hash");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires DATABASE_URL"]
    async fn test_reset_token_works_once_within_window(pool: PgPool) {
        let email = account(&pool, "fresh@example.com").await;
        let repo = UserRepository::new(&pool);

        let now = Utc::now();
        let expires = now + TimeDelta::hours(1) - TimeDelta::seconds(1);
        repo.set_reset_token(&email, "tok", expires).await.unwrap();

        let later = now + TimeDelta::minutes(59);
        let holder = repo.get_by_reset_token("tok", later).await.unwrap().unwrap();
        assert_eq!(holder.email, email);

        let reset = repo.reset_password("tok", later, "new-hash").await.unwrap();
        assert_eq!(reset.unwrap().email, email);
        assert!(repo.reset_password("tok", later, "other").await.unwrap().is_none());
        assert!(repo.get_by_reset_token("tok", later).await.unwrap().is_none());

        let (_, hash) = repo.get_password_hash(&email).await.unwrap().unwrap();
        assert_eq!(hash, "new-hash");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires DATABASE_URL"]
    async fn test_reset_token_for_unknown_email(pool: PgPool) {
        let repo = UserRepository::new(&pool);
        let email = Email::parse("nobody@example.com").unwrap();
        let result = repo
            .set_reset_token(&email, "tok", Utc::now() + TimeDelta::hours(1))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
