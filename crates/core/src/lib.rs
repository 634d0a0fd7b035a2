//! Markets Core - Shared domain types.
//!
//! This crate provides the types and pure logic used across the Markets
//! components:
//! - `storefront` - The store directory web service
//! - `cli` - Command-line tools for migrations and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP. Slug derivation lives here so the service layer
//! can compute a slug before it writes, independent of the storage engine.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails, ratings and slugs

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
