//! Domain service for authentication.
//!
//! Handles login, refresh-token rotation, logout and access-token checks.

use thiserror::Error;

use crate::services::tokens::{IssuedToken, VerifiedSession};

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is not activated")]
    NotActivated,

    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    #[error("Invalid refresh token")]
    MalformedRefreshToken,

    #[error("Invalid or expired access token")]
    InvalidAccessToken,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Token pair handed out at login and on every refresh.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh: IssuedToken,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies credentials and opens a new session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if login fails and
    /// [`AuthError::NotActivated`] for unverified accounts when activation
    /// is required.
    async fn login(&self, email: &str, password: &str) -> Result<SessionTokens, AuthError>;

    /// Exchanges a refresh token for a new pair, revoking the presented one.
    async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, AuthError>;

    /// Revokes the refresh token of the calling user.
    async fn logout(&self, user_id: i32, refresh_token: &str) -> Result<(), AuthError>;

    /// Checks an access token's signature and expiry.
    fn authenticate(&self, access_token: &str) -> Result<VerifiedSession, AuthError>;
}
