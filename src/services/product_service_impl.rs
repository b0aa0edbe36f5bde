//! `SeaORM` implementation of the `ProductService` trait.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::info;

use crate::db::{
    NewProduct, ProductChanges, ProductRecord, PublicListFilter, StockLine, StockUpdate, Store,
};
use crate::domain::{AssetKind, Material, slugify};
use crate::entities::product_colors;
use crate::services::image::encode_uploads;
use crate::services::product_service::{
    AdminProductPage, AdminProductSummary, ColorView, MAX_ADMIN_PAGE_SIZE, MAX_PUBLIC_PAGE_SIZE,
    ProductDetail, ProductDraft, ProductError, ProductListQuery, ProductPatch, ProductService,
    ProductSummary, PublicProductPage, StockRequest, StockShortfall,
};

pub struct SeaOrmProductService {
    store: Store,
}

impl SeaOrmProductService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    async fn ensure_url_free(&self, url: &str, except_id: Option<i32>) -> Result<(), ProductError> {
        if self.store.product_url_taken(url, except_id).await? {
            return Err(ProductError::UrlTaken(url.to_string()));
        }
        Ok(())
    }

    async fn load(&self, id: i32) -> Result<ProductDetail, ProductError> {
        self.store
            .get_product(id)
            .await?
            .map(ProductDetail::from)
            .ok_or(ProductError::NotFound(id))
    }
}

/// Number of pages needed for `total` rows.
#[must_use]
pub const fn page_count(total: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 0;
    }
    total.div_ceil(limit)
}

fn check_paging(page: u64, limit: u64, max_limit: u64) -> Result<(), ProductError> {
    if page == 0 {
        return Err(ProductError::Validation("page must be at least 1".to_string()));
    }
    if limit == 0 || limit > max_limit {
        return Err(ProductError::Validation(format!(
            "limit must be between 1 and {max_limit}"
        )));
    }
    Ok(())
}

fn encode_materials(materials: &[Material]) -> Result<String, ProductError> {
    let names: Vec<&str> = materials.iter().map(|m| m.as_str()).collect();
    serde_json::to_string(&names).map_err(|e| ProductError::Internal(e.to_string()))
}

fn decode_materials(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn decode_asset(data: &str) -> Result<Vec<u8>, ProductError> {
    STANDARD
        .decode(data)
        .map_err(|e| ProductError::Internal(format!("Corrupt stored asset: {e}")))
}

impl From<product_colors::Model> for ColorView {
    fn from(color: product_colors::Model) -> Self {
        Self {
            id: color.id,
            name: color.name,
            hex: color.hex,
            stock: color.stock,
        }
    }
}

impl From<ProductRecord> for ProductDetail {
    fn from(record: ProductRecord) -> Self {
        let product = record.product;
        Self {
            id: product.id,
            materials: decode_materials(&product.materials),
            name: product.name,
            en_name: product.en_name,
            url: product.url,
            brand: product.brand,
            code: product.code,
            category: product.category,
            price: product.price,
            public: product.public,
            colors: record.colors.into_iter().map(ColorView::from).collect(),
            images: record.images,
            has_model: record.has_model,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

#[async_trait]
impl ProductService for SeaOrmProductService {
    async fn list_public(&self, query: ProductListQuery) -> Result<PublicProductPage, ProductError> {
        check_paging(query.page, query.limit, MAX_PUBLIC_PAGE_SIZE)?;

        let filter = PublicListFilter {
            category: query.category.map(|c| c.as_str().to_string()),
            min_price: query.min_price.filter(|p| *p > 0).unwrap_or(0),
            max_price: query.max_price.filter(|p| *p > 0),
        };

        let (rows, total) = self
            .store
            .list_public_products(query.page, query.limit, &filter)
            .await?;

        Ok(PublicProductPage {
            products: rows
                .into_iter()
                .map(|(product, image)| ProductSummary {
                    id: product.id,
                    name: product.name,
                    en_name: product.en_name,
                    image,
                    price: product.price,
                    url: product.url,
                })
                .collect(),
            page_count: page_count(total, query.limit),
            total_count: total,
        })
    }

    async fn list_for_admin(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<AdminProductPage, ProductError> {
        check_paging(page, limit, MAX_ADMIN_PAGE_SIZE)?;

        let (rows, total) = self.store.list_all_products(page, limit).await?;

        Ok(AdminProductPage {
            products: rows
                .into_iter()
                .map(|(product, colors)| AdminProductSummary {
                    id: product.id,
                    name: product.name,
                    colors: colors.into_iter().map(ColorView::from).collect(),
                    public: product.public,
                })
                .collect(),
            page_count: page_count(total, limit),
            total_count: total,
        })
    }

    async fn get(&self, id: i32) -> Result<ProductDetail, ProductError> {
        self.load(id).await
    }

    async fn get_by_url(&self, url: &str) -> Result<ProductDetail, ProductError> {
        self.store
            .get_product_by_url(url)
            .await?
            .filter(|record| record.product.public)
            .map(ProductDetail::from)
            .ok_or_else(|| ProductError::UrlNotFound(url.to_string()))
    }

    async fn first_image(&self, id: i32) -> Result<Vec<u8>, ProductError> {
        let product = self
            .store
            .get_product_row(id)
            .await?
            .filter(|p| p.public)
            .ok_or(ProductError::NotFound(id))?;

        let data = self
            .store
            .product_asset(product.id, AssetKind::Image)
            .await?
            .ok_or(ProductError::AssetNotFound(id, "image"))?;

        decode_asset(&data)
    }

    async fn model_file(&self, id: i32) -> Result<Vec<u8>, ProductError> {
        if self.store.get_product_row(id).await?.is_none() {
            return Err(ProductError::NotFound(id));
        }

        let data = self
            .store
            .product_asset(id, AssetKind::Model)
            .await?
            .ok_or(ProductError::AssetNotFound(id, "model"))?;

        decode_asset(&data)
    }

    async fn create(&self, draft: ProductDraft) -> Result<ProductDetail, ProductError> {
        let url = slugify(&draft.name);
        self.ensure_url_free(&url, None).await?;

        let images = encode_uploads(draft.images).await?;
        let model = draft.model.map(|bytes| STANDARD.encode(bytes));

        let id = self
            .store
            .create_product(NewProduct {
                materials: encode_materials(&draft.materials)?,
                name: draft.name,
                en_name: draft.en_name,
                url,
                brand: draft.brand,
                code: draft.code,
                category: draft.category.as_str().to_string(),
                price: draft.price,
                public: draft.public,
                colors: draft.colors,
                images,
                model,
            })
            .await?;

        self.load(id).await
    }

    async fn update(&self, id: i32, patch: ProductPatch) -> Result<ProductDetail, ProductError> {
        if self.store.get_product_row(id).await?.is_none() {
            return Err(ProductError::NotFound(id));
        }

        let url = patch.name.as_deref().map(slugify);
        if let Some(url) = &url {
            self.ensure_url_free(url, Some(id)).await?;
        }

        let images = match patch.images {
            Some(uploads) => Some(encode_uploads(uploads).await?),
            None => None,
        };
        let materials = match patch.materials {
            Some(materials) => Some(encode_materials(&materials)?),
            None => None,
        };

        let changes = ProductChanges {
            name: patch.name,
            en_name: patch.en_name,
            url,
            brand: patch.brand,
            code: patch.code,
            category: patch.category.map(|c| c.as_str().to_string()),
            materials,
            price: patch.price,
            public: patch.public,
            colors: patch.colors,
            images,
            model: patch.model.map(|bytes| STANDARD.encode(bytes)),
        };

        if !self.store.update_product(id, changes).await? {
            return Err(ProductError::NotFound(id));
        }

        info!(product_id = id, "Updated product");
        self.load(id).await
    }

    async fn remove(&self, id: i32) -> Result<(), ProductError> {
        if self.store.delete_product(id).await? {
            Ok(())
        } else {
            Err(ProductError::NotFound(id))
        }
    }

    async fn decrease_stock(
        &self,
        lines: &[StockRequest],
    ) -> Result<Vec<StockShortfall>, ProductError> {
        let stock_lines: Vec<StockLine> = lines
            .iter()
            .map(|line| StockLine {
                product_id: line.product_id,
                color_id: line.color_id,
                quantity: line.quantity,
            })
            .collect();

        let updates = self.store.decrease_stock(&stock_lines).await?;

        let shortfalls = lines
            .iter()
            .zip(updates)
            .filter_map(|(line, update)| match update {
                StockUpdate::Applied => None,
                StockUpdate::Missing => Some(StockShortfall {
                    product_id: line.product_id,
                    color_id: line.color_id,
                    requested: line.quantity,
                    available: 0,
                }),
                StockUpdate::Insufficient { available } => Some(StockShortfall {
                    product_id: line.product_id,
                    color_id: line.color_id,
                    requested: line.quantity,
                    available,
                }),
            })
            .collect();

        Ok(shortfalls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 10), 0);
        assert_eq!(page_count(1, 10), 1);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(11, 10), 2);
        assert_eq!(page_count(5, 0), 0);
    }

    #[test]
    fn test_check_paging_limits() {
        assert!(check_paging(1, 50, MAX_PUBLIC_PAGE_SIZE).is_ok());
        assert!(check_paging(1, 51, MAX_PUBLIC_PAGE_SIZE).is_err());
        assert!(check_paging(0, 10, MAX_PUBLIC_PAGE_SIZE).is_err());
        assert!(check_paging(3, 500, MAX_ADMIN_PAGE_SIZE).is_ok());
        assert!(check_paging(3, 501, MAX_ADMIN_PAGE_SIZE).is_err());
    }

    #[test]
    fn test_materials_round_trip_through_json() {
        let raw = encode_materials(&[Material::Wood, Material::Steel]).unwrap();
        assert_eq!(raw, r#"["wood","steel"]"#);
        assert_eq!(decode_materials(&raw), vec!["wood", "steel"]);
        assert!(decode_materials("not json").is_empty());
    }
}
