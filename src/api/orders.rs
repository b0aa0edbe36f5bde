use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::AuthUser;
use super::validation::{validate_id, validate_length, validate_optional_length};
use super::{ApiError, ApiResponse, AppState, PageQuery};
use crate::db::OrderStatistics;
use crate::services::order_service::{CheckoutRedirect, OrderPage, OrderView};
use crate::services::{Buyer, OrderError, Requester, ShippingDetails};

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound(id) => Self::not_found("Order", id),
            OrderError::EmptyCart => Self::validation("Cart is empty"),
            OrderError::ProductUnavailable(id) => Self::not_found("Product", id),
            err @ (OrderError::InsufficientStock { .. } | OrderError::NotPaid(_)) => {
                Self::conflict(err.to_string())
            }
            OrderError::Validation(msg) => Self::validation(msg),
            OrderError::Payment(err) => Self::stripe_error(err.to_string()),
            OrderError::Database(msg) => Self::DatabaseError(msg),
            OrderError::Internal(msg) => Self::internal(msg),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub full_name: String,
    pub street: String,
    pub house_number: String,
    #[serde(default)]
    pub apartment_number: Option<String>,
    pub city: String,
    pub zip_code: String,
}

impl CreateOrderRequest {
    fn validate(self) -> Result<ShippingDetails, ApiError> {
        let full_name = self.full_name.trim().to_string();
        let street = self.street.trim().to_string();
        let house_number = self.house_number.trim().to_string();
        let city = self.city.trim().to_string();
        let zip_code = self.zip_code.trim().to_string();
        let apartment_number = self
            .apartment_number
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        validate_length("full_name", &full_name, 1, 50)?;
        validate_length("street", &street, 1, 100)?;
        validate_length("house_number", &house_number, 1, 10)?;
        validate_optional_length("apartment_number", apartment_number.as_deref(), 10)?;
        validate_length("city", &city, 1, 50)?;
        validate_length("zip_code", &zip_code, 1, 10)?;

        Ok(ShippingDetails {
            full_name,
            street,
            house_number,
            apartment_number,
            city,
            zip_code,
        })
    }
}

/// POST /orders
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutRedirect>>), ApiError> {
    let shipping = request.validate()?;
    let buyer = Buyer {
        user_id: user.id,
        email: user.email,
    };

    let redirect = state.order_service().create(buyer, shipping).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(redirect))))
}

/// GET /orders/all
pub async fn list_mine(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<OrderView>>>, ApiError> {
    let orders = state.order_service().list_for_user(user.id).await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// GET /orders/find-by-id/{id}
pub async fn find_by_id(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<OrderView>>, ApiError> {
    let id = validate_id("order", id)?;
    let requester = Requester {
        user_id: user.id,
        is_admin: user.is_admin(),
    };

    let order = state.order_service().find_one(id, requester).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// PATCH /orders/dispatch/{id}
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<OrderView>>, ApiError> {
    let id = validate_id("order", id)?;
    let order = state.order_service().dispatch(id).await?;

    tracing::info!(order_id = id, "Order dispatched");
    Ok(Json(ApiResponse::success(order)))
}

/// GET /orders/for-admin
pub async fn list_for_admin(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageQuery>,
) -> Result<Json<ApiResponse<OrderPage>>, ApiError> {
    let page = state
        .order_service()
        .list_for_admin(params.page, params.limit)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// GET /orders/statistics
pub async fn statistics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<OrderStatistics>>, ApiError> {
    let stats = state.order_service().statistics().await?;
    Ok(Json(ApiResponse::success(stats)))
}
