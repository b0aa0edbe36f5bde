use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::AuthUser;
use super::validation::{validate_email, validate_length, validate_password, validate_phone_number};
use super::{ApiError, ApiResponse, AppState};
use crate::db::User;
use crate::services::Registration;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl CreateUserRequest {
    fn validate(self) -> Result<Registration, ApiError> {
        let name = self.name.trim().to_string();
        let surname = self.surname.trim().to_string();
        let email = self.email.trim().to_string();
        let phone_number = self
            .phone_number
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        validate_length("name", &name, 2, 50)?;
        validate_length("surname", &surname, 2, 50)?;
        validate_email(&email)?;
        validate_password(&self.password)?;
        validate_phone_number(phone_number.as_deref())?;

        Ok(Registration {
            name,
            surname,
            email,
            password: self.password,
            phone_number,
        })
    }
}

/// POST /users
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<User>>), ApiError> {
    let registration = payload.validate()?;
    let user = state.user_service().register(registration).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

/// GET /users/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let profile = state.user_service().me(user.id).await?;
    Ok(Json(ApiResponse::success(profile)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateUserRequest {
        CreateUserRequest {
            name: " Ann ".to_string(),
            surname: "Kowalska".to_string(),
            email: "ann@example.com".to_string(),
            password: "secret1".to_string(),
            phone_number: Some("  ".to_string()),
        }
    }

    #[test]
    fn test_validate_trims_and_drops_blank_phone() {
        let registration = request().validate().unwrap();
        assert_eq!(registration.name, "Ann");
        assert_eq!(registration.phone_number, None);
    }

    #[test]
    fn test_validate_rejects_short_surname() {
        let mut req = request();
        req.surname = "K".to_string();
        assert!(req.validate().is_err());
    }
}
