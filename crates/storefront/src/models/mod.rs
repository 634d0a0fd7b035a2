//! Domain models for the store directory.
//!
//! These are validated domain objects, separate from the database row types
//! in [`crate::db`].

pub mod review;
pub mod session;
pub mod store;
pub mod user;

pub use review::{Review, ReviewWithAuthor};
pub use session::{CurrentUser, keys as session_keys};
pub use store::{
    AuthorSummary, Location, NearbyStore, Store, StoreDetail, StoreDraft, StorePage, TagCount, TopStore,
};
pub use user::User;
