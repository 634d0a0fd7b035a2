//! Integration tests for Markets.
//!
//! These tests drive a running storefront over HTTP.
//!
//! # Running Tests
//!
//! ```bash
//! # Migrate and start the server
//! cargo run -p markets-cli -- migrate
//! cargo run -p markets-storefront
//!
//! # Run the ignored integration tests
//! cargo test -p markets-integration-tests -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `MARKETS_TEST_URL` - Server under test (default `http://localhost:7777`)
//! - `MARKETS_DATABASE_URL` - Same database as the server, for reading reset tokens

use reqwest::{Client, StatusCode, multipart};
use serde_json::Value;
use uuid::Uuid;

/// Base URL of the server under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("MARKETS_TEST_URL").unwrap_or_else(|_| "http://localhost:7777".to_string())
}

/// A client that keeps its session cookie, standing in for one browser.
///
/// Each client reports a distinct forwarded IP so rate limits don't bleed
/// between tests.
///
/// # Panics
///
/// Panics if the HTTP client can't be built.
#[must_use]
pub fn browser() -> Client {
    let octet = Uuid::new_v4().as_bytes().first().copied().unwrap_or(1);
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "x-forwarded-for",
        format!("198.51.100.{octet}")
            .parse()
            .expect("valid header value"),
    );

    Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .default_headers(headers)
        .build()
        .expect("Failed to create HTTP client")
}

/// A fresh, unique email address.
#[must_use]
pub fn unique_email() -> String {
    format!("test-{}@example.com", Uuid::new_v4().simple())
}

/// A name that won't collide with other test runs.
#[must_use]
pub fn unique_name(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix} {}", id.get(..8).unwrap_or(&id))
}

/// Register a new account on `client` and return its email.
///
/// # Panics
///
/// Panics if registration fails.
pub async fn register(client: &Client, name: &str, password: &str) -> String {
    let email = unique_email();
    let resp = client
        .post(format!("{}/register", base_url()))
        .form(&[
            ("name", name),
            ("email", email.as_str()),
            ("password", password),
            ("password-confirm", password),
        ])
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), StatusCode::CREATED);
    email
}

/// Store form fields for a store named `name` in Hamilton, Ontario.
#[must_use]
pub fn store_form(name: &str, tags: &[&str]) -> multipart::Form {
    let mut form = multipart::Form::new()
        .text("name", name.to_owned())
        .text("description", "Integration test store")
        .text("address", "1 James St N, Hamilton, ON")
        .text("lng", "-79.8711")
        .text("lat", "43.2557");
    for tag in tags {
        form = form.text("tags", (*tag).to_owned());
    }
    form
}

/// Create a store as the user logged in on `client`.
///
/// # Panics
///
/// Panics if creation fails.
pub async fn create_store(client: &Client, name: &str, tags: &[&str]) -> Value {
    let resp = client
        .post(format!("{}/stores", base_url()))
        .multipart(store_form(name, tags))
        .send()
        .await
        .expect("Failed to create store");
    assert_eq!(resp.status(), StatusCode::CREATED);
    resp.json().await.expect("Invalid store JSON")
}

/// Connect to the server's database.
///
/// # Panics
///
/// Panics if no database URL is set or the connection fails.
pub async fn database() -> sqlx::PgPool {
    let url = std::env::var("MARKETS_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("MARKETS_DATABASE_URL not set");
    sqlx::PgPool::connect(&url)
        .await
        .expect("Failed to connect to database")
}
