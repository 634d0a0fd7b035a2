//! Account route handlers: profile, forgot password and password reset.

use axum::{
    Form, Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tower_sessions::Session;
use url::Url;

use markets_core::{Email, StoreId};

use super::auth::log_in;
use crate::error::Result;
use crate::middleware::{RequireAuth, set_current_user};
use crate::models::{CurrentUser, User};
use crate::services::auth::{AuthService, ResetToken};
use crate::services::stores::StoreService;
use crate::state::AppState;

/// Response for the forgot-password form, whether or not the account exists.
pub const RESET_SENT_MESSAGE: &str = "If that account exists, you have been emailed a password reset link.";

/// Account update form data.
#[derive(Debug, Deserialize)]
pub struct AccountForm {
    pub name: String,
    pub email: String,
}

/// Forgot password form data.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordForm {
    pub email: String,
}

/// Reset password form data.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub password: String,
    #[serde(rename = "password-confirm", alias = "password_confirm")]
    pub password_confirm: String,
}

/// The logged-in user's account.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    #[serde(flatten)]
    pub user: User,
    pub gravatar: String,
    pub hearts: Vec<StoreId>,
}

/// A valid reset token's account.
#[derive(Debug, Serialize)]
pub struct ResetFormResponse {
    pub email: Email,
}

/// Link delivered in the password reset email.
#[must_use]
pub fn reset_url(base_url: &Url, token: &str) -> String {
    format!(
        "{}/account/reset/{token}",
        base_url.as_str().trim_end_matches('/')
    )
}

/// Deliver the reset link in the background.
///
/// The forgot-password response doesn't wait on SMTP, so its timing is the
/// same whether or not the account exists.
fn spawn_reset_delivery(state: AppState, reset: ResetToken) -> JoinHandle<()> {
    tokio::spawn(async move { deliver_reset_link(&state, &reset).await })
}

/// Email the reset link, or log it when SMTP is not configured.
///
/// Delivery failures are logged but not returned.
async fn deliver_reset_link(state: &AppState, reset: &ResetToken) {
    let url = reset_url(&state.config().base_url, &reset.token);

    match state.email() {
        Some(email) => {
            if let Err(e) = email
                .send_password_reset(reset.user.email.as_str(), &reset.user.name, &url)
                .await
            {
                let event_id = sentry::capture_error(&e);
                tracing::error!(
                    error = %e,
                    sentry_event_id = %event_id,
                    user_id = %reset.user.id,
                    "Failed to send password reset email"
                );
            }
        }
        None => {
            tracing::info!(
                user_id = %reset.user.id,
                reset_url = %url,
                expires_at = %reset.expires_at,
                "Password reset link (SMTP not configured)"
            );
        }
    }
}

/// Current account with hearted store IDs.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<AccountResponse>> {
    let user = AuthService::new(state.pool()).get_user(current.id).await?;
    let hearts = StoreService::new(state.pool()).heart_ids(current.id).await?;
    Ok(Json(AccountResponse {
        gravatar: user.gravatar(),
        user,
        hearts,
    }))
}

/// Update the current account's name and email.
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Form(form): Form<AccountForm>,
) -> Result<Json<User>> {
    let user = AuthService::new(state.pool())
        .update_account(current.id, &form.name, &form.email)
        .await?;

    set_current_user(&session, &CurrentUser::from(&user)).await?;
    tracing::info!(user_id = %user.id, "Account updated");
    Ok(Json(user))
}

/// Issue a password reset token and deliver the link.
pub async fn forgot(
    State(state): State<AppState>,
    Form(form): Form<ForgotPasswordForm>,
) -> Result<Json<Value>> {
    let reset = AuthService::new(state.pool())
        .issue_reset_token(&form.email)
        .await?;
    if let Some(reset) = reset {
        spawn_reset_delivery(state, reset);
    }

    Ok(Json(json!({ "message": RESET_SENT_MESSAGE })))
}

/// Check a reset token before showing the new-password form.
pub async fn reset_form(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ResetFormResponse>> {
    let user = AuthService::new(state.pool())
        .check_reset_token(&token)
        .await?;
    Ok(Json(ResetFormResponse { email: user.email }))
}

/// Set a new password with a reset token and log the user in.
pub async fn reset(
    State(state): State<AppState>,
    session: Session,
    Path(token): Path<String>,
    Form(form): Form<ResetPasswordForm>,
) -> Result<Json<User>> {
    let user = AuthService::new(state.pool())
        .reset_password(&token, &form.password, &form.password_confirm)
        .await?;

    log_in(&session, &user).await?;
    Ok(Json(user))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeDelta, Utc};
    use markets_core::UserId;
    use sqlx::postgres::PgPoolOptions;

    use super::*;
    use crate::config::test_config;

    fn user() -> User {
        User {
            id: UserId::new(1),
            email: Email::parse("reset@example.com").unwrap(),
            name: "Reset".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_reset_url() {
        let token = "a".repeat(40);
        let base = Url::parse("https://markets.test").unwrap();
        assert_eq!(
            reset_url(&base, &token),
            format!("https://markets.test/account/reset/{token}")
        );

        let nested = Url::parse("http://localhost:7777/app/").unwrap();
        assert_eq!(
            reset_url(&nested, "abc"),
            "http://localhost:7777/app/account/reset/abc"
        );
    }

    #[tokio::test]
    async fn test_reset_delivery_runs_detached() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/markets_test")
            .unwrap();
        let state = AppState::new(test_config(), pool).unwrap();
        let reset = ResetToken {
            user: user(),
            token: "b".repeat(40),
            expires_at: Utc::now() + TimeDelta::hours(1),
        };

        // Without SMTP the link is logged and the task finishes on its own
        spawn_reset_delivery(state, reset).await.unwrap();
    }

    #[test]
    fn test_account_response_includes_gravatar() {
        let user = user();
        let response = AccountResponse {
            gravatar: user.gravatar(),
            user,
            hearts: vec![StoreId::new(3)],
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["email"], "reset@example.com");
        assert!(json["gravatar"].as_str().unwrap().starts_with("https://gravatar.com/avatar/"));
        assert_eq!(json["hearts"], json!([3]));
    }
}
