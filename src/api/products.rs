//! Catalog endpoints. Writes take `multipart/form-data` with text fields,
//! JSON encoded `colors`/`materials`, `images` files and an optional
//! `objFile`.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::validation::{validate_hex_color, validate_id};
use super::{ApiError, ApiResponse, AppState, MessageResponse, PageQuery};
use crate::db::ColorInput;
use crate::domain::{Category, Material};
use crate::services::product_service::{AdminProductPage, PublicProductPage};
use crate::services::{
    ProductDetail, ProductDraft, ProductError, ProductListQuery, ProductPatch,
};

pub const MAX_IMAGES: usize = 10;

const IMAGES_FIELD: &str = "images";
const MODEL_FIELD: &str = "objFile";

impl From<ProductError> for ApiError {
    fn from(err: ProductError) -> Self {
        match err {
            ProductError::NotFound(id) => Self::not_found("Product", id),
            ProductError::UrlNotFound(url) => Self::NotFound(format!("Product '{url}' not found")),
            err @ ProductError::AssetNotFound(..) => Self::NotFound(err.to_string()),
            err @ ProductError::UrlTaken(_) => Self::conflict(err.to_string()),
            ProductError::Validation(msg) => Self::validation(msg),
            ProductError::Database(msg) => Self::DatabaseError(msg),
            ProductError::Internal(msg) => Self::internal(msg),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductListParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub min_price: Option<i64>,
    #[serde(default)]
    pub max_price: Option<i64>,
}

const fn default_page() -> u64 {
    1
}

const fn default_limit() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
struct ColorPayload {
    #[serde(default, alias = "_id")]
    id: Option<i32>,
    name: String,
    hex: String,
    stock: i32,
}

/// Raw multipart content before validation.
#[derive(Debug, Default)]
pub struct ProductForm {
    fields: HashMap<String, String>,
    images: Vec<Vec<u8>>,
    model: Option<Vec<u8>>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /products
pub async fn list_public(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProductListParams>,
) -> Result<Json<ApiResponse<PublicProductPage>>, ApiError> {
    let query = ProductListQuery {
        page: params.page,
        limit: params.limit,
        // Unknown categories do not filter
        category: params.category.and_then(|c| c.parse::<Category>().ok()),
        min_price: params.min_price,
        max_price: params.max_price,
    };

    let page = state.product_service().list_public(query).await?;
    Ok(Json(ApiResponse::success(page)))
}

/// GET /products/admin
pub async fn list_for_admin(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageQuery>,
) -> Result<Json<ApiResponse<AdminProductPage>>, ApiError> {
    let page = state
        .product_service()
        .list_for_admin(params.page, params.limit)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// GET /products/by-id/{id}
pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let id = validate_id("product", id)?;
    let product = state.product_service().get(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// GET /products/by-name/{name}
pub async fn get_by_name(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let product = state.product_service().get_by_url(&name).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// GET /products/image/{id}
pub async fn image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let id = validate_id("product", id)?;
    let bytes = state.product_service().first_image(id).await?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

/// GET /products/obj/{id}.obj
pub async fn model_file(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_model_file_name(&file)?;
    let bytes = state.product_service().model_file(id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "model/obj".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{id}.obj\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// POST /products
pub async fn create(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<ProductDetail>>), ApiError> {
    let form = read_form(multipart).await?;
    let draft = draft_from_form(form)?;

    let product = state.product_service().create(draft).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

/// PUT /products/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let id = validate_id("product", id)?;
    let form = read_form(multipart).await?;
    let patch = patch_from_form(form)?;

    let product = state.product_service().update(id, patch).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// DELETE /products/{id}
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validate_id("product", id)?;
    state.product_service().remove(id).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "Product {id} removed"
    )))))
}

// ============================================================================
// Form parsing
// ============================================================================

async fn read_form(mut multipart: Multipart) -> Result<ProductForm, ApiError> {
    let mut form = ProductForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            IMAGES_FIELD | MODEL_FIELD => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("Failed to read upload: {e}")))?;
                if bytes.is_empty() {
                    continue;
                }

                if name == IMAGES_FIELD {
                    if form.images.len() == MAX_IMAGES {
                        return Err(ApiError::validation(format!(
                            "At most {MAX_IMAGES} images are allowed"
                        )));
                    }
                    form.images.push(bytes.to_vec());
                } else {
                    if form.model.is_some() {
                        return Err(ApiError::validation("Only one OBJ file is allowed"));
                    }
                    form.model = Some(bytes.to_vec());
                }
            }
            _ => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("Invalid field '{name}': {e}")))?;
                form.fields.insert(name, text);
            }
        }
    }

    Ok(form)
}

fn optional_text(fields: &HashMap<String, String>, key: &str) -> Result<Option<String>, ApiError> {
    match fields.get(key).map(|v| v.trim()) {
        None => Ok(None),
        Some("") => Err(ApiError::validation(format!("{key} must not be empty"))),
        Some(value) => Ok(Some(value.to_string())),
    }
}

fn required_text(fields: &HashMap<String, String>, key: &str) -> Result<String, ApiError> {
    optional_text(fields, key)?.ok_or_else(|| ApiError::validation(format!("{key} is required")))
}

fn parse_category(raw: &str) -> Result<Category, ApiError> {
    raw.parse()
        .map_err(|e: crate::domain::UnknownVariant| ApiError::validation(e.to_string()))
}

fn parse_price(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(price) if price > 0 => Ok(price),
        _ => Err(ApiError::validation("price must be a positive integer")),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ApiError> {
    match raw {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ApiError::validation(format!("{key} must be true or false"))),
    }
}

fn parse_colors(raw: &str) -> Result<Vec<ColorInput>, ApiError> {
    let colors: Vec<ColorPayload> = serde_json::from_str(raw)
        .map_err(|e| ApiError::validation(format!("colors must be a JSON array: {e}")))?;

    if colors.is_empty() {
        return Err(ApiError::validation("At least one color is required"));
    }

    colors
        .into_iter()
        .map(|color| {
            let name = color.name.trim().to_string();
            if name.is_empty() {
                return Err(ApiError::validation("color name must not be empty"));
            }
            validate_hex_color(&color.hex)?;
            if color.stock < 0 {
                return Err(ApiError::validation("stock must not be negative"));
            }
            Ok(ColorInput {
                id: color.id,
                name,
                hex: color.hex,
                stock: color.stock,
            })
        })
        .collect()
}

fn parse_materials(raw: &str) -> Result<Vec<Material>, ApiError> {
    let names: Vec<String> = serde_json::from_str(raw)
        .map_err(|e| ApiError::validation(format!("materials must be a JSON array: {e}")))?;

    if names.is_empty() {
        return Err(ApiError::validation("At least one material is required"));
    }

    let mut materials = Vec::with_capacity(names.len());
    for name in names {
        let material: Material = name
            .parse()
            .map_err(|e: crate::domain::UnknownVariant| ApiError::validation(e.to_string()))?;
        if !materials.contains(&material) {
            materials.push(material);
        }
    }
    Ok(materials)
}

fn parse_model_file_name(file: &str) -> Result<i32, ApiError> {
    let id = file
        .strip_suffix(".obj")
        .unwrap_or(file)
        .parse::<i32>()
        .map_err(|_| ApiError::validation(format!("Invalid model file name: {file}")))?;
    validate_id("product", id)
}

pub fn draft_from_form(form: ProductForm) -> Result<ProductDraft, ApiError> {
    let fields = &form.fields;

    if form.images.is_empty() {
        return Err(ApiError::validation("At least one image is required"));
    }

    Ok(ProductDraft {
        name: required_text(fields, "name")?,
        en_name: required_text(fields, "en_name")?,
        brand: required_text(fields, "brand")?,
        code: required_text(fields, "code")?,
        category: parse_category(&required_text(fields, "category")?)?,
        materials: parse_materials(&required_text(fields, "materials")?)?,
        price: parse_price(&required_text(fields, "price")?)?,
        public: parse_bool("public", &required_text(fields, "public")?)?,
        colors: parse_colors(&required_text(fields, "colors")?)?,
        images: form.images,
        model: form.model,
    })
}

pub fn patch_from_form(form: ProductForm) -> Result<ProductPatch, ApiError> {
    let fields = &form.fields;

    Ok(ProductPatch {
        name: optional_text(fields, "name")?,
        en_name: optional_text(fields, "en_name")?,
        brand: optional_text(fields, "brand")?,
        code: optional_text(fields, "code")?,
        category: optional_text(fields, "category")?
            .map(|raw| parse_category(&raw))
            .transpose()?,
        materials: optional_text(fields, "materials")?
            .map(|raw| parse_materials(&raw))
            .transpose()?,
        price: optional_text(fields, "price")?
            .map(|raw| parse_price(&raw))
            .transpose()?,
        public: optional_text(fields, "public")?
            .map(|raw| parse_bool("public", &raw))
            .transpose()?,
        colors: optional_text(fields, "colors")?
            .map(|raw| parse_colors(&raw))
            .transpose()?,
        images: (!form.images.is_empty()).then_some(form.images),
        model: form.model,
    })
}
