//! User domain types.

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::Serialize;

use markets_core::{Email, UserId};

/// A registered user (domain type).
///
/// The password hash and reset token never leave the repository layer.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Normalized (trimmed, lowercased) email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Gravatar image URL for the user's email, 200px square.
    #[must_use]
    pub fn gravatar(&self) -> String {
        let hash = Md5::digest(self.email.as_str().as_bytes());
        format!("https://gravatar.com/avatar/{}?s=200", hex::encode(hash))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_gravatar_hashes_normalized_email() {
        let user = User {
            id: UserId::new(1),
            email: Email::parse("  MyEmailAddress@example.com ").unwrap(),
            name: "Avatar".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(
            user.gravatar(),
            "https://gravatar.com/avatar/0bc83cb571cd1c50ba6f3e8a78ef1346?s=200"
        );
    }
}
