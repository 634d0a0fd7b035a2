//! Load sample users, stores and reviews from a YAML file.
//!
//! Everything goes through the storefront services, so seeded data gets the
//! same validation, password hashing and slug assignment as data entered
//! through the site. Users that already exist are reused.
//!
//! ```yaml
//! users:
//!   - name: Ada
//!     email: ada@example.com
//!     password: correct-horse
//! stores:
//!   - name: Cafe Bloom
//!     author: ada@example.com
//!     tags: [Wifi, Family Friendly]
//!     lng: -79.38
//!     lat: 43.65
//!     address: 1 Front St, Toronto
//! reviews:
//!   - store: Cafe Bloom
//!     author: ada@example.com
//!     rating: 5
//!     text: Great coffee.
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;

use markets_core::{Email, EmailError, StoreId, UserId};
use markets_storefront::db::{self, RepositoryError, users::UserRepository};
use markets_storefront::services::auth::{AuthError, AuthService, Registration};
use markets_storefront::services::stores::{ReviewInput, StoreError, StoreInput, StoreService};

use super::{CommandError, database_url};

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    /// Connection or configuration failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The seed file couldn't be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// The seed file isn't valid YAML for this format.
    #[error("Invalid seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A store or review names an author that isn't in the file or database.
    #[error("Unknown author: {0}")]
    UnknownAuthor(String),

    /// A review names a store that isn't in the file.
    #[error("Unknown store: {0}")]
    UnknownStore(String),

    #[error("Invalid email: {0}")]
    Email(#[from] EmailError),

    #[error("User error: {0}")]
    Auth(#[from] AuthError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Parsed seed file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedData {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub stores: Vec<SeedStore>,
    #[serde(default)]
    pub reviews: Vec<SeedReview>,
}

/// A user to register.
#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// A store to create, owned by `author` (an email).
#[derive(Debug, Deserialize)]
pub struct SeedStore {
    pub author: String,
    #[serde(flatten)]
    pub input: StoreInput,
    #[serde(default)]
    pub photo: Option<String>,
}

/// A review of the store named `store`, written by `author` (an email).
///
/// When several seeded stores share a name, the first one is reviewed.
#[derive(Debug, Deserialize)]
pub struct SeedReview {
    pub store: String,
    pub author: String,
    pub rating: i64,
    pub text: String,
}

/// Counts of inserted rows.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub stores: usize,
    pub reviews: usize,
}

impl SeedData {
    /// Parse a seed file's contents.
    ///
    /// # Errors
    ///
    /// Returns `SeedError::Yaml` on malformed input.
    pub fn parse(content: &str) -> Result<Self, SeedError> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Seed the database from `file_path`.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid, the database is
/// unreachable, or a record fails validation.
pub async fn run(file_path: &str, clear: bool) -> Result<(), SeedError> {
    let content = tokio::fs::read_to_string(Path::new(file_path))
        .await
        .map_err(|source| SeedError::Read {
            path: file_path.to_owned(),
            source,
        })?;
    let data = SeedData::parse(&content)?;
    tracing::info!(
        path = %file_path,
        users = data.users.len(),
        stores = data.stores.len(),
        reviews = data.reviews.len(),
        "Parsed seed file"
    );

    let pool = db::create_pool(&database_url()?)
        .await
        .map_err(CommandError::from)?;
    tracing::info!("Connected to database");

    if clear {
        clear_all(&pool).await?;
    }

    let summary = seed(&pool, &data).await?;
    tracing::info!(
        users = summary.users,
        stores = summary.stores,
        reviews = summary.reviews,
        "Seeding complete!"
    );
    Ok(())
}

/// Delete every user, store, review and heart.
async fn clear_all(pool: &PgPool) -> Result<(), CommandError> {
    sqlx::query(
        "TRUNCATE markets.review, markets.user_heart, markets.store, markets.user RESTART IDENTITY",
    )
    .execute(pool)
    .await?;
    tracing::info!("Cleared existing data");
    Ok(())
}

async fn seed(pool: &PgPool, data: &SeedData) -> Result<SeedSummary, SeedError> {
    let auth = AuthService::new(pool);
    let users = UserRepository::new(pool);
    let stores = StoreService::new(pool);
    let mut summary = SeedSummary::default();

    let mut authors: HashMap<String, UserId> = HashMap::new();
    for user in &data.users {
        let registration = Registration {
            name: user.name.clone(),
            email: user.email.clone(),
            password: user.password.clone(),
            password_confirm: user.password.clone(),
        };
        let id = match auth.register(&registration).await {
            Ok(created) => {
                summary.users += 1;
                created.id
            }
            Err(AuthError::UserAlreadyExists) => {
                tracing::info!(email = %user.email, "User exists, reusing");
                let email = Email::parse(&user.email)?;
                users
                    .get_by_email(&email)
                    .await?
                    .ok_or_else(|| SeedError::UnknownAuthor(user.email.clone()))?
                    .id
            }
            Err(e) => return Err(e.into()),
        };
        authors.insert(user.email.to_lowercase(), id);
    }

    let author_id = |email: &str| {
        authors
            .get(&email.trim().to_lowercase())
            .copied()
            .ok_or_else(|| SeedError::UnknownAuthor(email.to_owned()))
    };

    let mut store_ids: HashMap<&str, StoreId> = HashMap::new();
    for seed_store in &data.stores {
        let author = author_id(&seed_store.author)?;
        let draft = seed_store
            .input
            .clone()
            .into_draft(seed_store.photo.clone())?;
        let store = stores.create(author, &draft).await?;
        tracing::info!(store_id = %store.id, slug = %store.slug, "Seeded store");
        store_ids
            .entry(seed_store.input.name.as_str())
            .or_insert(store.id);
        summary.stores += 1;
    }

    for review in &data.reviews {
        let author = author_id(&review.author)?;
        let store_id = *store_ids
            .get(review.store.as_str())
            .ok_or_else(|| SeedError::UnknownStore(review.store.clone()))?;
        let input = ReviewInput {
            text: review.text.clone(),
            rating: review.rating,
        };
        stores.add_review(author, store_id, &input).await?;
        summary.reviews += 1;
    }

    Ok(summary)
}
