//! `SeaORM` implementation of the `CartService` trait.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::db::Store;
use crate::entities::{cart_items, product_colors, products};
use crate::services::cart_service::{
    CartError, CartLine, CartService, CartView, MAX_LINE_QUANTITY,
};

pub struct SeaOrmCartService {
    store: Store,
}

impl SeaOrmCartService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Drops cart lines whose product or color no longer exists, for every
    /// cart that holds them.
    async fn purge_dangling(
        &self,
        lines: &[cart_items::Model],
        products: &HashMap<i32, products::Model>,
        colors: &HashMap<i32, product_colors::Model>,
    ) -> Result<(), CartError> {
        for line in lines {
            if !products.contains_key(&line.product_id) {
                let removed = self.store.remove_product_from_carts(line.product_id).await?;
                debug!(product_id = line.product_id, removed, "Purged deleted product from carts");
            } else if !colors
                .get(&line.color_id)
                .is_some_and(|c| c.product_id == line.product_id)
            {
                let removed = self
                    .store
                    .remove_color_from_carts(line.product_id, line.color_id)
                    .await?;
                debug!(
                    product_id = line.product_id,
                    color_id = line.color_id,
                    removed,
                    "Purged deleted color from carts"
                );
            }
        }
        Ok(())
    }
}

/// Joins cart rows with catalog data, skipping lines that cannot be bought.
fn build_view(
    user_id: i32,
    lines: Vec<cart_items::Model>,
    products: &HashMap<i32, products::Model>,
    colors: &HashMap<i32, product_colors::Model>,
) -> CartView {
    let items = lines
        .into_iter()
        .filter_map(|line| {
            let product = products.get(&line.product_id).filter(|p| p.public)?;
            let color = colors
                .get(&line.color_id)
                .filter(|c| c.product_id == product.id)?;

            Some(CartLine {
                product_id: line.product_id,
                color_id: line.color_id,
                quantity: line.quantity,
                name: product.name.clone(),
                en_name: product.en_name.clone(),
                price: product.price,
                color: color.name.clone(),
                hex: color.hex.clone(),
            })
        })
        .collect();

    CartView { user_id, items }
}

#[async_trait]
impl CartService for SeaOrmCartService {
    async fn get(&self, user_id: i32) -> Result<CartView, CartError> {
        let lines = self.store.cart_items(user_id).await?;
        if lines.is_empty() {
            return Ok(CartView {
                user_id,
                items: Vec::new(),
            });
        }

        let product_ids: Vec<i32> = lines.iter().map(|l| l.product_id).collect();
        let color_ids: Vec<i32> = lines.iter().map(|l| l.color_id).collect();
        let products = self.store.get_products(&product_ids).await?;
        let colors = self.store.get_colors(&color_ids).await?;

        self.purge_dangling(&lines, &products, &colors).await?;

        Ok(build_view(user_id, lines, &products, &colors))
    }

    async fn add(
        &self,
        user_id: i32,
        product_id: i32,
        color_id: i32,
        quantity: i32,
    ) -> Result<CartView, CartError> {
        if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
            return Err(CartError::Validation(format!(
                "quantity must be between 1 and {MAX_LINE_QUANTITY}"
            )));
        }

        self.store
            .get_product_row(product_id)
            .await?
            .filter(|p| p.public)
            .ok_or(CartError::ProductNotFound(product_id))?;

        self.store
            .get_product_color(product_id, color_id)
            .await?
            .ok_or(CartError::ColorNotFound {
                product_id,
                color_id,
            })?;

        let line = self
            .store
            .add_cart_item(user_id, product_id, color_id, quantity, MAX_LINE_QUANTITY)
            .await?;

        info!(
            user_id,
            product_id,
            color_id,
            quantity = line.quantity,
            "Updated cart line"
        );
        self.get(user_id).await
    }

    async fn remove_item(
        &self,
        user_id: i32,
        product_id: i32,
        color_id: i32,
    ) -> Result<CartView, CartError> {
        if !self
            .store
            .remove_cart_item(user_id, product_id, color_id)
            .await?
        {
            return Err(CartError::ItemNotFound);
        }
        self.get(user_id).await
    }

    async fn clear(&self, user_id: i32) -> Result<(), CartError> {
        let removed = self.store.clear_cart(user_id).await?;
        debug!(user_id, removed, "Cleared cart");
        Ok(())
    }
}
