//! Domain service for per-user shopping carts.

use serde::Serialize;
use thiserror::Error;

pub const MAX_LINE_QUANTITY: i32 = 100;

#[derive(Debug, Error)]
pub enum CartError {
    #[error("Product {0} not found")]
    ProductNotFound(i32),

    #[error("Color {color_id} not found for product {product_id}")]
    ColorNotFound { product_id: i32, color_id: i32 },

    #[error("Item not found in cart")]
    ItemNotFound,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for CartError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for CartError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: i32,
    pub color_id: i32,
    pub quantity: i32,
    pub name: String,
    pub en_name: String,
    pub price: i64,
    pub color: String,
    pub hex: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CartView {
    pub user_id: i32,
    pub items: Vec<CartLine>,
}

#[async_trait::async_trait]
pub trait CartService: Send + Sync {
    /// Current cart. Lines for products that are gone or hidden are left out.
    async fn get(&self, user_id: i32) -> Result<CartView, CartError>;

    /// Adds to the product+color line, merging with an existing one.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Validation`] when `quantity` is outside
    /// `1..=MAX_LINE_QUANTITY`, and a not-found error when the product is not
    /// public or does not own the color.
    async fn add(
        &self,
        user_id: i32,
        product_id: i32,
        color_id: i32,
        quantity: i32,
    ) -> Result<CartView, CartError>;

    async fn remove_item(
        &self,
        user_id: i32,
        product_id: i32,
        color_id: i32,
    ) -> Result<CartView, CartError>;

    async fn clear(&self, user_id: i32) -> Result<(), CartError>;
}
