//! HTTP route handlers for the store directory.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                           - Stores, page 1
//! GET  /stores                     - Stores, page 1
//! GET  /stores/page/{page}         - Paginated stores
//! POST /stores                     - Create store (auth, multipart)
//! GET  /stores/{id}/edit           - Store for editing (auth, owner)
//! POST /stores/{id}                - Update store (auth, owner, multipart)
//! GET  /store/{slug}               - Store detail with reviews
//! GET  /tags                       - Tag histogram and tagged stores
//! GET  /tags/{tag}                 - Tag histogram and stores with tag
//! GET  /top                        - Top rated stores
//! GET  /hearts                     - Hearted stores (auth)
//! POST /reviews/{store_id}         - Add review (auth)
//!
//! # Auth (rate limited)
//! POST /register                   - Register and log in
//! POST /login                      - Log in
//! POST /logout                     - Log out
//!
//! # Account
//! GET  /account                    - Current account (auth)
//! POST /account                    - Update account (auth)
//! POST /account/forgot             - Issue reset token (rate limited)
//! GET  /account/reset/{token}      - Validate reset token
//! POST /account/reset/{token}      - Set new password
//!
//! # JSON API (rate limited)
//! GET  /api/search?q=              - Full-text store search
//! GET  /api/stores/near?lng=&lat=  - Stores near a point
//! POST /api/stores/{id}/heart      - Toggle heart (auth)
//! ```

pub mod account;
pub mod api;
pub mod auth;
pub mod hearts;
pub mod reviews;
pub mod stores;
pub mod tags;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Create the store routes router.
pub fn store_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(stores::index))
        .route(
            "/stores",
            get(stores::index)
                .post(stores::create)
                .layer(DefaultBodyLimit::max(stores::STORE_FORM_LIMIT)),
        )
        .route("/stores/page/{page}", get(stores::page))
        .route("/stores/{id}/edit", get(stores::edit))
        .route(
            "/stores/{id}",
            post(stores::update).layer(DefaultBodyLimit::max(stores::STORE_FORM_LIMIT)),
        )
        .route("/store/{slug}", get(stores::show))
        .route("/tags", get(tags::index))
        .route("/tags/{tag}", get(tags::show))
        .route("/top", get(stores::top))
        .route("/hearts", get(hearts::index))
        .route("/reviews/{store_id}", post(reviews::create))
}

/// Create the credential-handling routes, rate limited per client IP.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/account/forgot", post(account::forgot))
        .layer(auth_rate_limiter())
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(auth::logout))
        .route("/account", get(account::show).post(account::update))
        .route(
            "/account/reset/{token}",
            get(account::reset_form).post(account::reset),
        )
}

/// Create the JSON API routes router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/search", get(api::search))
        .route("/stores/near", get(api::near))
        .route("/stores/{id}/heart", post(hearts::toggle))
        .layer(api_rate_limiter())
}

/// Create all routes for the store directory.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(store_routes())
        .merge(auth_routes())
        .merge(account_routes())
        .nest("/api", api_routes())
}
