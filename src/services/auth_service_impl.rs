//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{Store, User};
use crate::services::auth_service::{AuthError, AuthService, SessionTokens};
use crate::services::tokens::{TokenService, VerifiedSession};

pub struct SeaOrmAuthService {
    store: Store,
    tokens: TokenService,
    config: Arc<Config>,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store, tokens: TokenService, config: Arc<Config>) -> Self {
        Self {
            store,
            tokens,
            config,
        }
    }

    async fn open_session(&self, user: &User) -> Result<SessionTokens, AuthError> {
        let access_token = self
            .tokens
            .issue_access(user.id, &user.email, &user.role)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let refresh = self
            .tokens
            .issue_refresh(user.id, &user.email, &user.role)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        self.store
            .store_refresh_token(
                user.id,
                &refresh.token,
                &refresh.jti,
                refresh.expires_at,
                self.config.auth.max_active_refresh_tokens,
                &self.config.security,
            )
            .await?;

        Ok(SessionTokens {
            access_token,
            refresh,
        })
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn login(&self, email: &str, password: &str) -> Result<SessionTokens, AuthError> {
        let user = self
            .store
            .verify_user_password(email, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if self.config.auth.require_activation && !user.activated {
            return Err(AuthError::NotActivated);
        }

        let session = self.open_session(&user).await?;
        info!(user_id = user.id, "User logged in");
        Ok(session)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, AuthError> {
        let claims = self
            .tokens
            .verify_refresh(refresh_token)
            .map_err(|_| AuthError::InvalidRefreshToken)?;
        let jti = claims.jti.ok_or(AuthError::InvalidRefreshToken)?;

        let now = chrono::Utc::now().timestamp();
        let Some(stored) = self
            .store
            .find_valid_refresh_token(&jti, refresh_token, now)
            .await?
        else {
            warn!(user_id = claims.user_id, "Rejected stale refresh token");
            return Err(AuthError::InvalidRefreshToken);
        };

        // Role or email may have changed since the token was issued.
        let user = self
            .store
            .get_user(stored.user_id)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        // A concurrent refresh with the same token may have won the revoke.
        if !self.store.revoke_refresh_token(&jti).await? {
            warn!(user_id = user.id, "Refresh token already rotated");
            return Err(AuthError::InvalidRefreshToken);
        }
        self.open_session(&user).await
    }

    async fn logout(&self, user_id: i32, refresh_token: &str) -> Result<(), AuthError> {
        let claims = self
            .tokens
            .verify_refresh(refresh_token)
            .map_err(|_| AuthError::MalformedRefreshToken)?;
        let jti = claims.jti.ok_or(AuthError::MalformedRefreshToken)?;

        if claims.user_id != user_id {
            return Err(AuthError::MalformedRefreshToken);
        }

        self.store.revoke_refresh_token(&jti).await?;
        info!(user_id, "User logged out");
        Ok(())
    }

    fn authenticate(&self, access_token: &str) -> Result<VerifiedSession, AuthError> {
        self.tokens
            .verify_access(access_token)
            .map_err(|_| AuthError::InvalidAccessToken)
    }
}
