use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::cart_items;

pub struct CartRepository {
    conn: DatabaseConnection,
}

impl CartRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn items(&self, user_id: i32) -> Result<Vec<cart_items::Model>> {
        cart_items::Entity::find()
            .filter(cart_items::Column::UserId.eq(user_id))
            .order_by_asc(cart_items::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to query cart items")
    }

    /// Adds `quantity` to the product+color line, creating it when missing.
    /// The merged quantity never exceeds `max_quantity`.
    pub async fn add(
        &self,
        user_id: i32,
        product_id: i32,
        color_id: i32,
        quantity: i32,
        max_quantity: i32,
    ) -> Result<cart_items::Model> {
        let existing = cart_items::Entity::find()
            .filter(cart_items::Column::UserId.eq(user_id))
            .filter(cart_items::Column::ProductId.eq(product_id))
            .filter(cart_items::Column::ColorId.eq(color_id))
            .one(&self.conn)
            .await
            .context("Failed to query cart line")?;

        let model = match existing {
            Some(line) => {
                let merged = merge_quantity(line.quantity, quantity, max_quantity);
                let mut active: cart_items::ActiveModel = line.into();
                active.quantity = Set(merged);
                active.update(&self.conn).await?
            }
            None => {
                cart_items::ActiveModel {
                    user_id: Set(user_id),
                    product_id: Set(product_id),
                    color_id: Set(color_id),
                    quantity: Set(quantity.min(max_quantity)),
                    created_at: Set(chrono::Utc::now().to_rfc3339()),
                    ..Default::default()
                }
                .insert(&self.conn)
                .await
                .context("Failed to insert cart line")?
            }
        };

        Ok(model)
    }

    pub async fn remove_item(&self, user_id: i32, product_id: i32, color_id: i32) -> Result<bool> {
        let result = cart_items::Entity::delete_many()
            .filter(cart_items::Column::UserId.eq(user_id))
            .filter(cart_items::Column::ProductId.eq(product_id))
            .filter(cart_items::Column::ColorId.eq(color_id))
            .exec(&self.conn)
            .await
            .context("Failed to delete cart line")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn clear(&self, user_id: i32) -> Result<u64> {
        let result = cart_items::Entity::delete_many()
            .filter(cart_items::Column::UserId.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to clear cart")?;

        Ok(result.rows_affected)
    }

    pub async fn remove_product(&self, product_id: i32) -> Result<u64> {
        let result = cart_items::Entity::delete_many()
            .filter(cart_items::Column::ProductId.eq(product_id))
            .exec(&self.conn)
            .await
            .context("Failed to remove product from carts")?;

        Ok(result.rows_affected)
    }

    pub async fn remove_color(&self, product_id: i32, color_id: i32) -> Result<u64> {
        let result = cart_items::Entity::delete_many()
            .filter(cart_items::Column::ProductId.eq(product_id))
            .filter(cart_items::Column::ColorId.eq(color_id))
            .exec(&self.conn)
            .await
            .context("Failed to remove color from carts")?;

        Ok(result.rows_affected)
    }
}

#[must_use]
pub fn merge_quantity(current: i32, added: i32, max_quantity: i32) -> i32 {
    current.saturating_add(added).min(max_quantity)
}
