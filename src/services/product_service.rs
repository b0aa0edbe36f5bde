//! Domain service for the product catalog.

use serde::Serialize;
use thiserror::Error;

use crate::db::ColorInput;
use crate::domain::{Category, Material};

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("Product {0} not found")]
    NotFound(i32),

    #[error("Product '{0}' not found")]
    UrlNotFound(String),

    #[error("Product {0} has no {1}")]
    AssetNotFound(i32, &'static str),

    #[error("A product named like '{0}' already exists")]
    UrlTaken(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for ProductError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for ProductError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<crate::services::image::ImageError> for ProductError {
    fn from(err: crate::services::image::ImageError) -> Self {
        match err {
            crate::services::image::ImageError::Decode(msg) => {
                Self::Validation(format!("Invalid image: {msg}"))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

pub const MAX_PUBLIC_PAGE_SIZE: u64 = 50;
pub const MAX_ADMIN_PAGE_SIZE: u64 = 500;

#[derive(Debug, Clone, Default)]
pub struct ProductListQuery {
    pub page: u64,
    pub limit: u64,
    pub category: Option<Category>,
    /// Zero or absent means no bound
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub id: i32,
    pub name: String,
    pub en_name: String,
    /// First image, base64 encoded JPEG
    pub image: Option<String>,
    pub price: i64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicProductPage {
    pub products: Vec<ProductSummary>,
    pub page_count: u64,
    pub total_count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ColorView {
    pub id: i32,
    pub name: String,
    pub hex: String,
    pub stock: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminProductSummary {
    pub id: i32,
    pub name: String,
    pub colors: Vec<ColorView>,
    pub public: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminProductPage {
    pub products: Vec<AdminProductSummary>,
    pub page_count: u64,
    pub total_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    pub id: i32,
    pub name: String,
    pub en_name: String,
    pub url: String,
    pub brand: String,
    pub code: String,
    pub category: String,
    pub materials: Vec<String>,
    pub price: i64,
    pub public: bool,
    pub colors: Vec<ColorView>,
    pub images: Vec<String>,
    pub has_model: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Validated input for a new product. Uploads are raw bytes.
#[derive(Debug, Clone)]
pub struct ProductDraft {
    pub name: String,
    pub en_name: String,
    pub brand: String,
    pub code: String,
    pub category: Category,
    pub materials: Vec<Material>,
    pub price: i64,
    pub public: bool,
    pub colors: Vec<ColorInput>,
    pub images: Vec<Vec<u8>>,
    pub model: Option<Vec<u8>>,
}

/// Partial product update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub en_name: Option<String>,
    pub brand: Option<String>,
    pub code: Option<String>,
    pub category: Option<Category>,
    pub materials: Option<Vec<Material>>,
    pub price: Option<i64>,
    pub public: Option<bool>,
    pub colors: Option<Vec<ColorInput>>,
    pub images: Option<Vec<Vec<u8>>>,
    pub model: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockRequest {
    pub product_id: i32,
    pub color_id: i32,
    pub quantity: i32,
}

/// A line that could not be fully covered. `available` is what the color had
/// left, zero when the color no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockShortfall {
    pub product_id: i32,
    pub color_id: i32,
    pub requested: i32,
    pub available: i32,
}

#[async_trait::async_trait]
pub trait ProductService: Send + Sync {
    /// Paged storefront listing, public products only.
    ///
    /// # Errors
    ///
    /// Returns [`ProductError::Validation`] if `limit` exceeds
    /// [`MAX_PUBLIC_PAGE_SIZE`].
    async fn list_public(&self, query: ProductListQuery) -> Result<PublicProductPage, ProductError>;

    async fn list_for_admin(&self, page: u64, limit: u64)
    -> Result<AdminProductPage, ProductError>;

    async fn get(&self, id: i32) -> Result<ProductDetail, ProductError>;

    /// Looks up a public product by its slug.
    async fn get_by_url(&self, url: &str) -> Result<ProductDetail, ProductError>;

    /// Decoded first image of a public product.
    async fn first_image(&self, id: i32) -> Result<Vec<u8>, ProductError>;

    /// Decoded OBJ model.
    async fn model_file(&self, id: i32) -> Result<Vec<u8>, ProductError>;

    async fn create(&self, draft: ProductDraft) -> Result<ProductDetail, ProductError>;

    async fn update(&self, id: i32, patch: ProductPatch) -> Result<ProductDetail, ProductError>;

    async fn remove(&self, id: i32) -> Result<(), ProductError>;

    /// Decrements stock for each line independently and reports the lines
    /// that were short.
    async fn decrease_stock(
        &self,
        lines: &[StockRequest],
    ) -> Result<Vec<StockShortfall>, ProductError>;
}
