//! Domain service for accounts: registration, email verification and the
//! password reset flow.

use thiserror::Error;

use crate::db::User;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("User with this email already exists")]
    EmailTaken,

    #[error("User not found")]
    NotFound,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for UserError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for UserError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Validated registration input.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
    pub phone_number: Option<String>,
}

#[async_trait::async_trait]
pub trait UserService: Send + Sync {
    /// Creates an unactivated customer and emails the confirmation link.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::EmailTaken`] if the address is already registered.
    async fn register(&self, registration: Registration) -> Result<User, UserError>;

    /// Activates the account named by a verification token. Idempotent.
    async fn verify_email(&self, token: &str) -> Result<(), UserError>;

    /// Emails a reset link when the address is known. Unknown addresses are
    /// not reported to the caller.
    async fn forgot_password(&self, email: &str) -> Result<(), UserError>;

    /// Replaces the password and revokes every refresh token of the user.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::InvalidToken`] for expired, foreign or reused links.
    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), UserError>;

    async fn me(&self, user_id: i32) -> Result<User, UserError>;

    /// Creates the account as an activated admin, or promotes an existing one.
    async fn ensure_admin(&self, email: &str, password: &str) -> Result<User, UserError>;
}
