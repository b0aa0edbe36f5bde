//! Signed JWTs for access, refresh and emailed links.
//!
//! Each kind uses its own HS256 secret so a token of one kind never
//! verifies as another.

use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;

/// Clock skew accepted when checking `exp`/`nbf`.
const TIME_TOLERANCE_SECS: u64 = 5;

pub const PURPOSE_VERIFY: &str = "verify";
pub const PURPOSE_RESET: &str = "reset";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to sign token: {0}")]
    Signing(String),

    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// Custom claims carried by access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailClaims {
    pub purpose: String,
    /// Digest of the password hash at issue time; reset links die once the
    /// password changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Verified access or refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSession {
    pub user_id: i32,
    pub email: String,
    pub role: String,
    pub jti: Option<String>,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedMailToken {
    pub user_id: i32,
    pub purpose: String,
    pub fingerprint: Option<String>,
}

#[derive(Clone)]
pub struct TokenService {
    access_key: HS256Key,
    refresh_key: HS256Key,
    mail_key: HS256Key,
    access_ttl: Duration,
    refresh_ttl: Duration,
    verify_ttl: Duration,
    reset_ttl: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_key: HS256Key::from_bytes(config.jwt_secret.as_bytes()),
            refresh_key: HS256Key::from_bytes(config.jwt_refresh_secret.as_bytes()),
            mail_key: HS256Key::from_bytes(config.jwt_mail_secret.as_bytes()),
            access_ttl: Duration::from_mins(config.access_token_ttl_minutes),
            refresh_ttl: Duration::from_days(config.refresh_token_ttl_days),
            verify_ttl: Duration::from_hours(config.verify_token_ttl_hours),
            reset_ttl: Duration::from_mins(config.reset_token_ttl_minutes),
        }
    }

    pub fn issue_access(&self, user_id: i32, email: &str, role: &str) -> Result<String, TokenError> {
        let claims = Claims::with_custom_claims(session_claims(email, role), self.access_ttl)
            .with_subject(user_id.to_string());

        self.access_key
            .authenticate(claims)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn issue_refresh(
        &self,
        user_id: i32,
        email: &str,
        role: &str,
    ) -> Result<IssuedToken, TokenError> {
        let jti = Uuid::new_v4().to_string();
        let claims = Claims::with_custom_claims(session_claims(email, role), self.refresh_ttl)
            .with_subject(user_id.to_string())
            .with_jwt_id(&jti);

        let expires_at = claims
            .expires_at
            .map(|ts| i64::try_from(ts.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or_default();

        let token = self
            .refresh_key
            .authenticate(claims)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            jti,
            expires_at,
        })
    }

    pub fn issue_verify_email(&self, user_id: i32) -> Result<String, TokenError> {
        self.issue_mail(user_id, PURPOSE_VERIFY, None, self.verify_ttl)
    }

    pub fn issue_password_reset(
        &self,
        user_id: i32,
        fingerprint: String,
    ) -> Result<String, TokenError> {
        self.issue_mail(user_id, PURPOSE_RESET, Some(fingerprint), self.reset_ttl)
    }

    fn issue_mail(
        &self,
        user_id: i32,
        purpose: &str,
        fingerprint: Option<String>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let custom = MailClaims {
            purpose: purpose.to_string(),
            fingerprint,
        };
        let claims = Claims::with_custom_claims(custom, ttl).with_subject(user_id.to_string());

        self.mail_key
            .authenticate(claims)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn verify_access(&self, token: &str) -> Result<VerifiedSession, TokenError> {
        verify_session(&self.access_key, token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<VerifiedSession, TokenError> {
        let session = verify_session(&self.refresh_key, token)?;
        if session.jti.is_none() {
            return Err(TokenError::Invalid("missing jti".to_string()));
        }
        Ok(session)
    }

    /// Verifies an emailed link token and checks its purpose.
    pub fn verify_mail(&self, token: &str, purpose: &str) -> Result<VerifiedMailToken, TokenError> {
        let claims = self
            .mail_key
            .verify_token::<MailClaims>(token, Some(verification_options()))
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        if claims.custom.purpose != purpose {
            return Err(TokenError::Invalid("wrong token purpose".to_string()));
        }

        Ok(VerifiedMailToken {
            user_id: parse_subject(claims.subject.as_deref())?,
            purpose: claims.custom.purpose,
            fingerprint: claims.custom.fingerprint,
        })
    }
}

fn session_claims(email: &str, role: &str) -> SessionClaims {
    SessionClaims {
        email: email.to_string(),
        role: role.to_string(),
    }
}

fn verification_options() -> VerificationOptions {
    VerificationOptions {
        time_tolerance: Some(Duration::from_secs(TIME_TOLERANCE_SECS)),
        ..Default::default()
    }
}

fn verify_session(key: &HS256Key, token: &str) -> Result<VerifiedSession, TokenError> {
    let claims = key
        .verify_token::<SessionClaims>(token, Some(verification_options()))
        .map_err(|e| TokenError::Invalid(e.to_string()))?;

    Ok(VerifiedSession {
        user_id: parse_subject(claims.subject.as_deref())?,
        email: claims.custom.email,
        role: claims.custom.role,
        jti: claims.jwt_id,
        expires_at: claims
            .expires_at
            .map(|ts| i64::try_from(ts.as_secs()).unwrap_or(i64::MAX)),
    })
}

fn parse_subject(subject: Option<&str>) -> Result<i32, TokenError> {
    subject
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TokenError::Invalid("missing or malformed subject".to_string()))
}
