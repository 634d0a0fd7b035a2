//! Core types for Markets.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod rating;
pub mod slug;

pub use email::{Email, EmailError};
pub use id::*;
pub use rating::{Rating, RatingError};
pub use slug::{Slug, compute_slug, rename_slug, slug_family_pattern, slugify};
