//! End-to-end tests for registration, login and password reset.
//!
//! The reset test reads the issued token from the database, so it needs
//! `MARKETS_DATABASE_URL` pointing at the server's database.
//!
//! Run with: `cargo test -p markets-integration-tests -- --ignored`

use markets_integration_tests::{base_url, browser, database, register};
use reqwest::StatusCode;
use serde_json::Value;

const PASSWORD: &str = "integration-password";

#[tokio::test]
#[ignore = "Requires running storefront and database"]
async fn test_register_login_logout() {
    let client = browser();
    let email = register(&client, "Account Holder", PASSWORD).await;

    let account: Value = client
        .get(format!("{}/account", base_url()))
        .send()
        .await
        .expect("Failed to get account")
        .json()
        .await
        .expect("Invalid JSON");
    assert_eq!(account["email"], email.as_str());

    let resp = client
        .post(format!("{}/logout", base_url()))
        .send()
        .await
        .expect("Failed to log out");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{}/account", base_url()))
        .send()
        .await
        .expect("Failed to get account");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .post(format!("{}/login", base_url()))
        .form(&[("email", email.as_str()), ("password", "wrong-password")])
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .post(format!("{}/login", base_url()))
        .form(&[("email", email.as_str()), ("password", PASSWORD)])
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running storefront and database"]
async fn test_duplicate_registration_conflicts() {
    let client = browser();
    let email = register(&client, "First", PASSWORD).await;

    let resp = browser()
        .post(format!("{}/register", base_url()))
        .form(&[
            ("name", "Second"),
            ("email", email.as_str()),
            ("password", PASSWORD),
            ("password-confirm", PASSWORD),
        ])
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "Requires running storefront and database"]
async fn test_password_reset_flow() {
    let client = browser();
    let email = register(&client, "Forgetful", PASSWORD).await;
    client
        .post(format!("{}/logout", base_url()))
        .send()
        .await
        .expect("Failed to log out");

    // Same response for known and unknown accounts
    let known: Value = client
        .post(format!("{}/account/forgot", base_url()))
        .form(&[("email", email.as_str())])
        .send()
        .await
        .expect("Failed to request reset")
        .json()
        .await
        .expect("Invalid JSON");
    let unknown: Value = browser()
        .post(format!("{}/account/forgot", base_url()))
        .form(&[("email", "nobody-here@example.com")])
        .send()
        .await
        .expect("Failed to request reset")
        .json()
        .await
        .expect("Invalid JSON");
    assert_eq!(known, unknown);

    let pool = database().await;
    let token: String =
        sqlx::query_scalar("SELECT reset_password_token FROM markets.user WHERE email = $1")
            .bind(&email)
            .fetch_one(&pool)
            .await
            .expect("Failed to read reset token");
    assert_eq!(token.len(), 40);

    let reset_url = format!("{}/account/reset/{token}", base_url());
    let resp = client.get(&reset_url).send().await.expect("Failed to check token");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .post(&reset_url)
        .form(&[("password", "new-password-1"), ("password-confirm", "different-2")])
        .send()
        .await
        .expect("Failed to reset");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .post(&reset_url)
        .form(&[("password", "new-password-1"), ("password-confirm", "new-password-1")])
        .send()
        .await
        .expect("Failed to reset");
    assert_eq!(resp.status(), StatusCode::OK);

    // Logged in, and the token is spent
    let resp = client
        .get(format!("{}/account", base_url()))
        .send()
        .await
        .expect("Failed to get account");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client.get(&reset_url).send().await.expect("Failed to check token");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "Requires running storefront and database"]
async fn test_unknown_reset_token_is_not_found() {
    let resp = browser()
        .get(format!("{}/account/reset/{}", base_url(), "0".repeat(40)))
        .send()
        .await
        .expect("Failed to check token");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.expect("Invalid JSON");
    assert_eq!(body["error"], "Password reset is invalid or has expired");
}
