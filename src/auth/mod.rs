//! Identity provider: accounts, sign-in and the current session.

pub mod local;
pub mod session;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::challenge::{UserId, Viewer};

pub use local::LocalIdentityProvider;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Enter a valid email address.")]
    InvalidEmail,

    #[error("Password must be at least 6 characters.")]
    WeakPassword,

    #[error("An account with that email already exists.")]
    EmailInUse,

    #[error("Unable to sign in. Please double-check your credentials.")]
    InvalidCredentials,

    #[error("You need to sign in first.")]
    NotSignedIn,

    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

impl AuthError {
    /// Errors caused by what the user typed, as opposed to a failing backend.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEmail
                | Self::WeakPassword
                | Self::EmailInUse
                | Self::InvalidCredentials
                | Self::NotSignedIn
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl User {
    /// Name written into membership documents: profile name, then email,
    /// then `fallback`.
    pub fn membership_name(&self, fallback: &str) -> String {
        self.display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| Some(self.email.clone()).filter(|e| !e.is_empty()))
            .unwrap_or_else(|| fallback.to_string())
    }
}

impl From<&User> for Viewer {
    fn from(user: &User) -> Self {
        Viewer {
            user_id: user.id.clone(),
            display_name: user.display_name.clone(),
            email: Some(user.email.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub token: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct SignUpProfile {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, profile: SignUpProfile) -> Result<Session, AuthError>;

    async fn sign_in(&self, credentials: Credentials) -> Result<Session, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    fn current_session(&self) -> Option<Session>;

    /// Resume a previously issued session. Unknown or expired tokens give
    /// `None` and leave the provider signed out.
    async fn restore(&self, token: &str) -> Result<Option<Session>, AuthError>;

    /// Session-change notifications. The receiver always holds the latest
    /// session (or `None` when signed out).
    fn watch(&self) -> watch::Receiver<Option<Session>>;

    /// The current session, or `NotSignedIn`.
    fn require_session(&self) -> Result<Session, AuthError> {
        self.current_session().ok_or(AuthError::NotSignedIn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(display_name: Option<&str>, email: &str) -> User {
        User {
            id: UserId::new("u1"),
            email: email.to_string(),
            display_name: display_name.map(str::to_string),
            photo_url: None,
        }
    }

    #[test]
    fn membership_name_prefers_profile_then_email() {
        assert_eq!(user(Some("Ana"), "ana@example.com").membership_name("Owner"), "Ana");
        assert_eq!(user(Some(" "), "ana@example.com").membership_name("Owner"), "ana@example.com");
        assert_eq!(user(None, "").membership_name("Member"), "Member");
    }

    #[test]
    fn viewer_from_user_carries_email() {
        let viewer = Viewer::from(&user(None, "ana@example.com"));
        assert_eq!(viewer.fallback_name(), "ana@example.com");
    }

    #[test]
    fn user_errors_are_classified() {
        assert!(AuthError::EmailInUse.is_user_error());
        assert!(AuthError::InvalidCredentials.is_user_error());
        assert!(!AuthError::Sql(rusqlite::Error::QueryReturnedNoRows).is_user_error());
    }
}
