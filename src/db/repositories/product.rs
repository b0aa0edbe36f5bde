use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::Expr,
};
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::domain::AssetKind;
use crate::entities::{cart_items, product_assets, product_colors, products};

#[derive(Debug, Clone)]
pub struct ColorInput {
    /// Existing color id when editing, `None` for a new color.
    pub id: Option<i32>,
    pub name: String,
    pub hex: String,
    pub stock: i32,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub en_name: String,
    pub url: String,
    pub brand: String,
    pub code: String,
    pub category: String,
    pub materials: String,
    pub price: i64,
    pub public: bool,
    pub colors: Vec<ColorInput>,
    /// Base64 encoded JPEG images in display order
    pub images: Vec<String>,
    /// Base64 encoded OBJ model
    pub model: Option<String>,
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub en_name: Option<String>,
    pub url: Option<String>,
    pub brand: Option<String>,
    pub code: Option<String>,
    pub category: Option<String>,
    pub materials: Option<String>,
    pub price: Option<i64>,
    pub public: Option<bool>,
    pub colors: Option<Vec<ColorInput>>,
    pub images: Option<Vec<String>>,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub product: products::Model,
    pub colors: Vec<product_colors::Model>,
    pub images: Vec<String>,
    pub has_model: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLine {
    pub product_id: i32,
    pub color_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockUpdate {
    Applied,
    Missing,
    Insufficient { available: i32 },
}

#[derive(Debug, Clone, Default)]
pub struct PublicListFilter {
    pub category: Option<String>,
    pub min_price: i64,
    pub max_price: Option<i64>,
}

pub struct ProductRepository {
    conn: DatabaseConnection,
}

impl ProductRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// One page of public products with their first image, plus the total
    /// number of matches.
    pub async fn list_public(
        &self,
        page: u64,
        limit: u64,
        filter: &PublicListFilter,
    ) -> Result<(Vec<(products::Model, Option<String>)>, u64)> {
        let mut query = products::Entity::find()
            .filter(products::Column::Public.eq(true))
            .filter(products::Column::Price.gte(filter.min_price));

        if let Some(max) = filter.max_price {
            query = query.filter(products::Column::Price.lte(max));
        }
        if let Some(category) = &filter.category {
            query = query.filter(products::Column::Category.eq(category.as_str()));
        }

        let total = query
            .clone()
            .count(&self.conn)
            .await
            .context("Failed to count public products")?;

        let rows = query
            .order_by_asc(products::Column::Id)
            .offset(page.saturating_sub(1) * limit)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to query public products")?;

        let ids: Vec<i32> = rows.iter().map(|p| p.id).collect();
        let mut images = self.first_images(&ids).await?;

        Ok((
            rows.into_iter()
                .map(|p| {
                    let image = images.remove(&p.id);
                    (p, image)
                })
                .collect(),
            total,
        ))
    }

    pub async fn list_all(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<(products::Model, Vec<product_colors::Model>)>, u64)> {
        let total = products::Entity::find()
            .count(&self.conn)
            .await
            .context("Failed to count products")?;

        let rows = products::Entity::find()
            .order_by_asc(products::Column::Id)
            .offset(page.saturating_sub(1) * limit)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to query products")?;

        let ids: Vec<i32> = rows.iter().map(|p| p.id).collect();
        let mut colors = self.colors_by_product(&ids).await?;

        Ok((
            rows.into_iter()
                .map(|p| {
                    let product_colors = colors.remove(&p.id).unwrap_or_default();
                    (p, product_colors)
                })
                .collect(),
            total,
        ))
    }

    pub async fn get(&self, id: i32) -> Result<Option<ProductRecord>> {
        let product = products::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query product by ID")?;

        match product {
            Some(product) => Ok(Some(self.load_record(product).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_url(&self, url: &str) -> Result<Option<ProductRecord>> {
        let product = products::Entity::find()
            .filter(products::Column::Url.eq(url))
            .one(&self.conn)
            .await
            .context("Failed to query product by url")?;

        match product {
            Some(product) => Ok(Some(self.load_record(product).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_model(&self, id: i32) -> Result<Option<products::Model>> {
        products::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query product by ID")
    }

    pub async fn url_taken(&self, url: &str, except_id: Option<i32>) -> Result<bool> {
        let mut query = products::Entity::find().filter(products::Column::Url.eq(url));
        if let Some(id) = except_id {
            query = query.filter(products::Column::Id.ne(id));
        }

        let count = query
            .count(&self.conn)
            .await
            .context("Failed to check product url")?;

        Ok(count > 0)
    }

    /// Base64 payload of an asset, by kind and position.
    pub async fn asset(&self, product_id: i32, kind: AssetKind) -> Result<Option<String>> {
        let asset = product_assets::Entity::find()
            .filter(product_assets::Column::ProductId.eq(product_id))
            .filter(product_assets::Column::Kind.eq(kind.as_str()))
            .order_by_asc(product_assets::Column::Position)
            .one(&self.conn)
            .await
            .context("Failed to query product asset")?;

        Ok(asset.map(|a| a.data))
    }

    pub async fn color(
        &self,
        product_id: i32,
        color_id: i32,
    ) -> Result<Option<product_colors::Model>> {
        product_colors::Entity::find_by_id(color_id)
            .filter(product_colors::Column::ProductId.eq(product_id))
            .one(&self.conn)
            .await
            .context("Failed to query product color")
    }

    pub async fn create(&self, new_product: NewProduct) -> Result<i32> {
        let now = chrono::Utc::now().to_rfc3339();
        let txn = self.conn.begin().await?;

        let product = products::ActiveModel {
            name: Set(new_product.name),
            en_name: Set(new_product.en_name),
            url: Set(new_product.url),
            brand: Set(new_product.brand),
            code: Set(new_product.code),
            category: Set(new_product.category),
            materials: Set(new_product.materials),
            price: Set(new_product.price),
            public: Set(new_product.public),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .context("Failed to insert product")?;

        for color in new_product.colors {
            insert_color(&txn, product.id, color).await?;
        }

        insert_assets(&txn, product.id, AssetKind::Image, new_product.images).await?;
        if let Some(model) = new_product.model {
            insert_assets(&txn, product.id, AssetKind::Model, vec![model]).await?;
        }

        txn.commit().await?;

        info!(product_id = product.id, "Created product");
        Ok(product.id)
    }

    /// Applies a partial update. Returns false when the product does not exist.
    ///
    /// Cart lines pointing at removed colors are deleted, and so are all cart
    /// lines of a product that stops being public.
    pub async fn update(&self, id: i32, changes: ProductChanges) -> Result<bool> {
        let txn = self.conn.begin().await?;

        let Some(existing) = products::Entity::find_by_id(id).one(&txn).await? else {
            return Ok(false);
        };

        let was_public = existing.public;
        let mut active: products::ActiveModel = existing.into();

        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(en_name) = changes.en_name {
            active.en_name = Set(en_name);
        }
        if let Some(url) = changes.url {
            active.url = Set(url);
        }
        if let Some(brand) = changes.brand {
            active.brand = Set(brand);
        }
        if let Some(code) = changes.code {
            active.code = Set(code);
        }
        if let Some(category) = changes.category {
            active.category = Set(category);
        }
        if let Some(materials) = changes.materials {
            active.materials = Set(materials);
        }
        if let Some(price) = changes.price {
            active.price = Set(price);
        }
        if let Some(public) = changes.public {
            active.public = Set(public);
        }
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        let updated = active.update(&txn).await?;

        if let Some(colors) = changes.colors {
            reconcile_colors(&txn, id, colors).await?;
        }

        if let Some(images) = changes.images {
            delete_assets(&txn, id, AssetKind::Image).await?;
            insert_assets(&txn, id, AssetKind::Image, images).await?;
        }

        if let Some(model) = changes.model {
            delete_assets(&txn, id, AssetKind::Model).await?;
            insert_assets(&txn, id, AssetKind::Model, vec![model]).await?;
        }

        if was_public && !updated.public {
            let purged = cart_items::Entity::delete_many()
                .filter(cart_items::Column::ProductId.eq(id))
                .exec(&txn)
                .await?;
            info!(
                product_id = id,
                cart_lines = purged.rows_affected,
                "Product hidden, removed from carts"
            );
        }

        txn.commit().await?;
        Ok(true)
    }

    /// Deletes the product, its colors, assets and cart lines.
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let txn = self.conn.begin().await?;

        cart_items::Entity::delete_many()
            .filter(cart_items::Column::ProductId.eq(id))
            .exec(&txn)
            .await?;
        product_assets::Entity::delete_many()
            .filter(product_assets::Column::ProductId.eq(id))
            .exec(&txn)
            .await?;
        product_colors::Entity::delete_many()
            .filter(product_colors::Column::ProductId.eq(id))
            .exec(&txn)
            .await?;
        let result = products::Entity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;

        let removed = result.rows_affected > 0;
        if removed {
            info!("Removed product with ID: {}", id);
        }
        Ok(removed)
    }

    /// Decrements stock line by line and returns one update per line, in
    /// order. A short line takes whatever is left and the others still apply.
    pub async fn decrease_stock(&self, lines: &[StockLine]) -> Result<Vec<StockUpdate>> {
        let mut updates = Vec::with_capacity(lines.len());
        for line in lines {
            updates.push(self.decrease_line(line).await?);
        }
        Ok(updates)
    }

    async fn decrease_line(&self, line: &StockLine) -> Result<StockUpdate> {
        let txn = self.conn.begin().await?;

        let color = product_colors::Entity::find_by_id(line.color_id)
            .filter(product_colors::Column::ProductId.eq(line.product_id))
            .one(&txn)
            .await
            .context("Failed to query color stock")?;

        let Some(color) = color else {
            return Ok(StockUpdate::Missing);
        };

        let taken = color.stock.clamp(0, line.quantity.max(0));
        if taken > 0 {
            product_colors::Entity::update_many()
                .col_expr(
                    product_colors::Column::Stock,
                    Expr::col(product_colors::Column::Stock).sub(taken),
                )
                .filter(product_colors::Column::Id.eq(color.id))
                .exec(&txn)
                .await
                .context("Failed to decrement color stock")?;
        }

        txn.commit().await?;

        if taken < line.quantity {
            Ok(StockUpdate::Insufficient { available: color.stock })
        } else {
            Ok(StockUpdate::Applied)
        }
    }

    pub async fn find_many(&self, ids: &[i32]) -> Result<HashMap<i32, products::Model>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = products::Entity::find()
            .filter(products::Column::Id.is_in(ids.iter().copied()))
            .all(&self.conn)
            .await
            .context("Failed to query products by IDs")?;

        Ok(rows.into_iter().map(|p| (p.id, p)).collect())
    }

    pub async fn find_colors(&self, ids: &[i32]) -> Result<HashMap<i32, product_colors::Model>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = product_colors::Entity::find()
            .filter(product_colors::Column::Id.is_in(ids.iter().copied()))
            .all(&self.conn)
            .await
            .context("Failed to query colors by IDs")?;

        Ok(rows.into_iter().map(|c| (c.id, c)).collect())
    }

    async fn load_record(&self, product: products::Model) -> Result<ProductRecord> {
        let colors = product_colors::Entity::find()
            .filter(product_colors::Column::ProductId.eq(product.id))
            .order_by_asc(product_colors::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to query product colors")?;

        let assets = product_assets::Entity::find()
            .filter(product_assets::Column::ProductId.eq(product.id))
            .order_by_asc(product_assets::Column::Position)
            .all(&self.conn)
            .await
            .context("Failed to query product assets")?;

        let mut images = Vec::new();
        let mut has_model = false;
        for asset in assets {
            if asset.kind == AssetKind::Image.as_str() {
                images.push(asset.data);
            } else if asset.kind == AssetKind::Model.as_str() {
                has_model = true;
            }
        }

        Ok(ProductRecord {
            product,
            colors,
            images,
            has_model,
        })
    }

    async fn first_images(&self, ids: &[i32]) -> Result<HashMap<i32, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = product_assets::Entity::find()
            .filter(product_assets::Column::ProductId.is_in(ids.iter().copied()))
            .filter(product_assets::Column::Kind.eq(AssetKind::Image.as_str()))
            .filter(product_assets::Column::Position.eq(0))
            .all(&self.conn)
            .await
            .context("Failed to query product images")?;

        Ok(rows.into_iter().map(|a| (a.product_id, a.data)).collect())
    }

    async fn colors_by_product(
        &self,
        ids: &[i32],
    ) -> Result<HashMap<i32, Vec<product_colors::Model>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = product_colors::Entity::find()
            .filter(product_colors::Column::ProductId.is_in(ids.iter().copied()))
            .order_by_asc(product_colors::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to query product colors")?;

        let mut grouped: HashMap<i32, Vec<product_colors::Model>> = HashMap::new();
        for color in rows {
            grouped.entry(color.product_id).or_default().push(color);
        }
        Ok(grouped)
    }
}

async fn insert_color<C: ConnectionTrait>(conn: &C, product_id: i32, color: ColorInput) -> Result<()> {
    product_colors::ActiveModel {
        product_id: Set(product_id),
        name: Set(color.name),
        hex: Set(color.hex),
        stock: Set(color.stock),
        ..Default::default()
    }
    .insert(conn)
    .await
    .context("Failed to insert product color")?;

    Ok(())
}

/// Updates colors that keep their id, inserts new ones and deletes the rest
/// together with the cart lines that referenced them.
async fn reconcile_colors<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
    colors: Vec<ColorInput>,
) -> Result<()> {
    let existing: HashMap<i32, product_colors::Model> = product_colors::Entity::find()
        .filter(product_colors::Column::ProductId.eq(product_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    let mut kept = HashSet::new();

    for color in colors {
        match color.id.and_then(|id| existing.get(&id)) {
            Some(current) => {
                kept.insert(current.id);
                let mut active: product_colors::ActiveModel = current.clone().into();
                active.name = Set(color.name);
                active.hex = Set(color.hex);
                active.stock = Set(color.stock);
                active.update(conn).await?;
            }
            None => insert_color(conn, product_id, color).await?,
        }
    }

    let removed: Vec<i32> = existing
        .keys()
        .copied()
        .filter(|id| !kept.contains(id))
        .collect();

    if !removed.is_empty() {
        cart_items::Entity::delete_many()
            .filter(cart_items::Column::ProductId.eq(product_id))
            .filter(cart_items::Column::ColorId.is_in(removed.clone()))
            .exec(conn)
            .await?;
        product_colors::Entity::delete_many()
            .filter(product_colors::Column::Id.is_in(removed))
            .exec(conn)
            .await?;
    }

    Ok(())
}

async fn insert_assets<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
    kind: AssetKind,
    payloads: Vec<String>,
) -> Result<()> {
    for (position, data) in payloads.into_iter().enumerate() {
        product_assets::ActiveModel {
            product_id: Set(product_id),
            kind: Set(kind.as_str().to_string()),
            position: Set(i32::try_from(position).unwrap_or(i32::MAX)),
            data: Set(data),
            ..Default::default()
        }
        .insert(conn)
        .await
        .context("Failed to insert product asset")?;
    }

    Ok(())
}

async fn delete_assets<C: ConnectionTrait>(conn: &C, product_id: i32, kind: AssetKind) -> Result<()> {
    product_assets::Entity::delete_many()
        .filter(product_assets::Column::ProductId.eq(product_id))
        .filter(product_assets::Column::Kind.eq(kind.as_str()))
        .exec(conn)
        .await?;

    Ok(())
}
