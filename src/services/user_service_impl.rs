//! `SeaORM` implementation of the `UserService` trait.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{NewUser, Store, User};
use crate::domain::Role;
use crate::services::mail::Mailer;
use crate::services::tokens::{PURPOSE_RESET, PURPOSE_VERIFY, TokenService};
use crate::services::user_service::{Registration, UserError, UserService};

pub struct SeaOrmUserService {
    store: Store,
    tokens: TokenService,
    mailer: Arc<dyn Mailer>,
    config: Arc<Config>,
}

impl SeaOrmUserService {
    #[must_use]
    pub fn new(
        store: Store,
        tokens: TokenService,
        mailer: Arc<dyn Mailer>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            tokens,
            mailer,
            config,
        }
    }
}

/// Binds a reset token to the password hash it was issued against.
#[must_use]
pub fn password_fingerprint(password_hash: &str) -> String {
    hex::encode(Sha256::digest(password_hash.as_bytes()))
}

#[async_trait]
impl UserService for SeaOrmUserService {
    async fn register(&self, registration: Registration) -> Result<User, UserError> {
        if self.store.email_exists(&registration.email).await? {
            return Err(UserError::EmailTaken);
        }

        let user = self
            .store
            .create_user(
                NewUser {
                    name: registration.name,
                    surname: registration.surname,
                    email: registration.email,
                    password: registration.password,
                    phone_number: registration.phone_number,
                    role: Role::Customer,
                    activated: false,
                },
                &self.config.security,
            )
            .await?;

        let token = self
            .tokens
            .issue_verify_email(user.id)
            .map_err(|e| UserError::Internal(e.to_string()))?;

        // Delivery failures are logged, the account stays registered.
        if let Err(e) = self
            .mailer
            .send_register_confirmation(&user.email, &user.name, &token)
            .await
        {
            warn!(user_id = user.id, error = %e, "Failed to send confirmation email");
        }

        info!(user_id = user.id, "Registered user");
        Ok(user)
    }

    async fn verify_email(&self, token: &str) -> Result<(), UserError> {
        let verified = self
            .tokens
            .verify_mail(token, PURPOSE_VERIFY)
            .map_err(|_| UserError::InvalidToken)?;

        if self.store.activate_user(verified.user_id).await? {
            info!(user_id = verified.user_id, "Activated account");
            Ok(())
        } else {
            Err(UserError::NotFound)
        }
    }

    async fn forgot_password(&self, email: &str) -> Result<(), UserError> {
        let Some(user) = self.store.get_user_by_email(email).await? else {
            info!("Password reset requested for unknown address");
            return Ok(());
        };

        let hash = self
            .store
            .user_password_hash(user.id)
            .await?
            .ok_or(UserError::NotFound)?;

        let token = self
            .tokens
            .issue_password_reset(user.id, password_fingerprint(&hash))
            .map_err(|e| UserError::Internal(e.to_string()))?;

        if let Err(e) = self.mailer.send_password_reset(&user.email, &token).await {
            warn!(user_id = user.id, error = %e, "Failed to send password reset email");
        }

        Ok(())
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), UserError> {
        let verified = self
            .tokens
            .verify_mail(token, PURPOSE_RESET)
            .map_err(|_| UserError::InvalidToken)?;

        let current_hash = self
            .store
            .user_password_hash(verified.user_id)
            .await?
            .ok_or(UserError::InvalidToken)?;

        if verified.fingerprint.as_deref() != Some(password_fingerprint(&current_hash).as_str()) {
            return Err(UserError::InvalidToken);
        }

        let revoked = self
            .store
            .reset_user_password(verified.user_id, new_password, &self.config.security)
            .await?;

        info!(
            user_id = verified.user_id,
            revoked_sessions = revoked,
            "Password reset"
        );
        Ok(())
    }

    async fn me(&self, user_id: i32) -> Result<User, UserError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or(UserError::NotFound)
    }

    async fn ensure_admin(&self, email: &str, password: &str) -> Result<User, UserError> {
        if let Some(user) = self.store.get_user_by_email(email).await? {
            if !user.is_admin() || !user.activated {
                self.store.promote_to_admin(user.id).await?;
                info!(user_id = user.id, "Promoted existing user to admin");
            }
            return self.me(user.id).await;
        }

        let user = self
            .store
            .create_user(
                NewUser {
                    name: "Admin".to_string(),
                    surname: "Admin".to_string(),
                    email: email.to_string(),
                    password: password.to_string(),
                    phone_number: None,
                    role: Role::Admin,
                    activated: true,
                },
                &self.config.security,
            )
            .await?;

        info!(user_id = user.id, "Created bootstrap admin");
        Ok(user)
    }
}
