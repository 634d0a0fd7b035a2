//! Business logic services for the store directory.
//!
//! # Services
//!
//! - `auth` - Registration, login, account updates and password resets
//! - `email` - Password reset email delivery
//! - `stores` - Slugs, ownership, listing, tags, rankings, reviews and hearts
//! - `uploads` - Store photo validation and resizing

pub mod auth;
pub mod email;
pub mod stores;
pub mod uploads;

pub use auth::{AuthError, AuthService};
pub use email::{EmailError, EmailService};
pub use stores::{StoreError, StoreService};
pub use uploads::UploadError;
