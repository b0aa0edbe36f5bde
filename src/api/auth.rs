use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_sessions::cookie::{Cookie, SameSite};

use super::validation::{validate_email, validate_password};
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::domain::Role;
use crate::services::{AuthError, SessionTokens, UserError};

pub const REFRESH_COOKIE: &str = "refreshToken";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Identity taken from a verified access token.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: i32,
    pub email: String,
    pub role: String,
}

impl AuthUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin.as_str()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::unauthorized("Invalid credentials"),
            AuthError::NotActivated => {
                Self::forbidden("Account is not activated, check your email")
            }
            AuthError::InvalidRefreshToken => {
                Self::unauthorized("Invalid or expired refresh token")
            }
            AuthError::MalformedRefreshToken => Self::unauthorized("Invalid refresh token"),
            AuthError::InvalidAccessToken => Self::unauthorized("Invalid or expired token"),
            AuthError::Database(msg) => Self::DatabaseError(msg),
            AuthError::Internal(msg) => Self::internal(msg),
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::EmailTaken => Self::conflict("User with this email already exists"),
            UserError::NotFound => Self::NotFound("User not found".to_string()),
            UserError::InvalidToken => Self::validation("Invalid or expired token"),
            UserError::Validation(msg) => Self::validation(msg),
            UserError::Database(msg) => Self::DatabaseError(msg),
            UserError::Internal(msg) => Self::internal(msg),
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Requires `Authorization: Bearer <access token>` and exposes the caller
/// as an [`AuthUser`] extension.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing access token"))?;

    let session = state.auth_service().authenticate(&token)?;

    tracing::Span::current().record("user_id", session.user_id);

    request.extensions_mut().insert(AuthUser {
        id: session.user_id,
        email: session.email,
        role: session.role,
    });

    Ok(next.run(request).await)
}

/// Runs after [`auth_middleware`]; reloads the user so a demoted admin loses
/// access before their token expires.
pub async fn admin_middleware(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let current = state
        .store()
        .get_user(user.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load user: {e}")))?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    if !current.is_admin() {
        return Err(ApiError::forbidden("Admin access required"));
    }

    Ok(next.run(request).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    validate_email(&payload.email)?;
    validate_password(&payload.password)?;

    let tokens = state
        .auth_service()
        .login(&payload.email, &payload.password)
        .await?;

    session_response(&state, tokens)
}

/// POST /auth/refresh
/// Rotates the refresh cookie and returns a fresh access token.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let presented = read_cookie(&headers, REFRESH_COOKIE)
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired refresh token"))?;

    let tokens = state.auth_service().refresh(&presented).await?;

    session_response(&state, tokens)
}

/// DELETE /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let presented = read_cookie(&headers, REFRESH_COOKIE)
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    state.auth_service().logout(user.id, &presented).await?;

    let cookie = Cookie::build((REFRESH_COOKIE, ""))
        .http_only(true)
        .secure(state.config().server.secure_cookies)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();

    with_cookie(
        Json(ApiResponse::success(MessageResponse::new("Logged out"))).into_response(),
        &cookie,
    )
}

/// GET /auth/profile
pub async fn profile(Extension(user): Extension<AuthUser>) -> Json<ApiResponse<AuthUser>> {
    Json(ApiResponse::success(user))
}

/// POST /auth/verify-email
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.user_service().verify_email(&payload.token).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Email verified, you can now log in",
    ))))
}

/// POST /auth/forgot-password
/// Answers identically whether or not the address is registered.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    validate_email(&payload.email)?;

    state.user_service().forgot_password(&payload.email).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "If an account with that email exists, a reset link has been sent",
    ))))
}

/// POST /auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    validate_password(&payload.password)?;

    state
        .user_service()
        .reset_password(&payload.token, &payload.password)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password has been reset",
    ))))
}

// ============================================================================
// Helpers
// ============================================================================

fn session_response(state: &AppState, tokens: SessionTokens) -> Result<Response, ApiError> {
    let max_age = tokens.refresh.expires_at - chrono::Utc::now().timestamp();

    let cookie = Cookie::build((REFRESH_COOKIE, tokens.refresh.token))
        .http_only(true)
        .secure(state.config().server.secure_cookies)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::seconds(max_age.max(0)))
        .build();

    let body = Json(ApiResponse::success(AccessTokenResponse {
        access_token: tokens.access_token,
    }));

    with_cookie(body.into_response(), &cookie)
}

fn with_cookie(mut response: Response, cookie: &Cookie<'_>) -> Result<Response, ApiError> {
    let value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| ApiError::internal(format!("Invalid cookie header: {e}")))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(response)
}

/// Value of the named cookie from the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| Cookie::parse(pair.trim()).ok())
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; refreshToken=abc.def.ghi; other=1"),
        );

        assert_eq!(
            read_cookie(&headers, REFRESH_COOKIE).as_deref(),
            Some("abc.def.ghi")
        );
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_empty_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("refreshToken="));
        assert_eq!(read_cookie(&headers, REFRESH_COOKIE), None);
    }

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(extract_bearer(&headers).as_deref(), Some("tok"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic tok"));
        assert_eq!(extract_bearer(&headers), None);
    }
}
