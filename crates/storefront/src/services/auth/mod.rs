//! Authentication service.
//!
//! Password registration and login, account updates and password resets.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use sqlx::PgPool;

use markets_core::{Email, UserId};

use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::models::User;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Random bytes in a reset token (hex-encoded to 40 characters).
const RESET_TOKEN_BYTES: usize = 20;

/// How long a reset token stays valid.
const RESET_TOKEN_TTL_SECS: i64 = 60 * 60;

/// Registration form input.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "password-confirm", alias = "password_confirm")]
    pub password_confirm: String,
}

/// A freshly issued password reset token.
#[derive(Debug, Clone)]
pub struct ResetToken {
    /// Account the token was issued for.
    pub user: User,
    /// 40 lowercase hex characters.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
        }
    }

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingName` if the name is blank.
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::PasswordMismatch` if the confirmation differs.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(&self, input: &Registration) -> Result<User, AuthError> {
        let name = validate_name(&input.name)?;
        let email = Email::parse(&input.email)?;
        validate_new_password(&input.password, &input.password_confirm)?;

        let password_hash = hash_password(&input.password)?;

        let user = self
            .users
            .create(&email, name, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        Ok(user)
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Change a user's name and email.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingName` or `AuthError::InvalidEmail` on bad input.
    /// Returns `AuthError::UserAlreadyExists` if another account uses the email.
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn update_account(
        &self,
        user_id: UserId,
        name: &str,
        email: &str,
    ) -> Result<User, AuthError> {
        let name = validate_name(name)?;
        let email = Email::parse(email)?;

        self.users
            .update_account(user_id, &email, name)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                RepositoryError::NotFound => AuthError::UserNotFound,
                other => AuthError::Repository(other),
            })
    }

    /// Issue a reset token for the account with this email, if there is one.
    ///
    /// Returns `None` when no account matches; callers must respond the same
    /// way in both cases.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    pub async fn issue_reset_token(&self, email: &str) -> Result<Option<ResetToken>, AuthError> {
        let email = Email::parse(email)?;
        let token = generate_reset_token();
        let expires_at = Utc::now() + TimeDelta::seconds(RESET_TOKEN_TTL_SECS);

        let user = self
            .users
            .set_reset_token(&email, &token, expires_at)
            .await?;

        Ok(user.map(|user| ResetToken {
            user,
            token,
            expires_at,
        }))
    }

    /// Look up the account holding an unexpired reset token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidResetToken` if the token is unknown or expired.
    pub async fn check_reset_token(&self, token: &str) -> Result<User, AuthError> {
        self.users
            .get_by_reset_token(token, Utc::now())
            .await?
            .ok_or(AuthError::InvalidResetToken)
    }

    /// Set a new password using a reset token, consuming the token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PasswordMismatch` or `AuthError::WeakPassword` on bad input.
    /// Returns `AuthError::InvalidResetToken` if the token is unknown or expired.
    pub async fn reset_password(
        &self,
        token: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<User, AuthError> {
        validate_new_password(password, password_confirm)?;
        let password_hash = hash_password(password)?;

        let user = self
            .users
            .reset_password(token, Utc::now(), &password_hash)
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        tracing::info!(user_id = %user.id, "Password reset");
        Ok(user)
    }
}

/// Trim a display name, rejecting blank ones.
fn validate_name(name: &str) -> Result<&str, AuthError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::MissingName);
    }
    Ok(name)
}

/// Validate a new password and its confirmation.
fn validate_new_password(password: &str, confirm: &str) -> Result<(), AuthError> {
    validate_password(password)?;
    if password != confirm {
        return Err(AuthError::PasswordMismatch);
    }
    Ok(())
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Generate a random reset token.
fn generate_reset_token() -> String {
    let bytes: [u8; RESET_TOKEN_BYTES] = rand::rng().random();
    hex::encode(bytes)
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("correct horse").unwrap();
        let b = hash_password("correct horse").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_validate_new_password() {
        assert!(validate_new_password("longenough", "longenough").is_ok());
        assert!(matches!(
            validate_new_password("short", "short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            validate_new_password("longenough", "different!"),
            Err(AuthError::PasswordMismatch)
        ));
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Wes Bos ").unwrap(), "Wes Bos");
        assert!(matches!(validate_name("   "), Err(AuthError::MissingName)));
    }

    #[test]
    fn test_reset_token_format() {
        let token = generate_reset_token();
        assert_eq!(token.len(), 40);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_reset_token());
    }

    #[test]
    fn test_registration_accepts_form_field_names() {
        let input: Registration = serde_json::from_str(
            r#"{"name":"Wes","email":"wes@example.com","password":"hunter22","password-confirm":"hunter22"}"#,
        )
        .unwrap();
        assert_eq!(input.password_confirm, "hunter22");
    }
}
