use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::AuthUser;
use super::validation::validate_id;
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::services::{CartError, CartView};

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::ProductNotFound(id) => Self::not_found("Product", id),
            err @ (CartError::ColorNotFound { .. } | CartError::ItemNotFound) => {
                Self::NotFound(err.to_string())
            }
            CartError::Validation(msg) => Self::validation(msg),
            CartError::Database(msg) => Self::DatabaseError(msg),
            CartError::Internal(msg) => Self::internal(msg),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: i32,
    pub color_id: i32,
    pub quantity: i32,
}

/// GET /cart
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<CartView>>, ApiError> {
    let cart = state.cart_service().get(user.id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// PATCH /cart
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<AddToCartRequest>,
) -> Result<Json<ApiResponse<CartView>>, ApiError> {
    let product_id = validate_id("product", request.product_id)?;
    let color_id = validate_id("color", request.color_id)?;

    let cart = state
        .cart_service()
        .add(user.id, product_id, color_id, request.quantity)
        .await?;

    tracing::debug!(
        user_id = user.id,
        product_id,
        color_id,
        quantity = request.quantity,
        "Added item to cart"
    );
    Ok(Json(ApiResponse::success(cart)))
}

/// DELETE /cart/items/{product_id}/{color_id}
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((product_id, color_id)): Path<(i32, i32)>,
) -> Result<Json<ApiResponse<CartView>>, ApiError> {
    let cart = state
        .cart_service()
        .remove_item(user.id, product_id, color_id)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// DELETE /cart
pub async fn clear(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.cart_service().clear(user.id).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Cart cleared",
    ))))
}
