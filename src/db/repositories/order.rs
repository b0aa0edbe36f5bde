use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait, sea_query::Expr,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use crate::domain::{DeliveryStatus, PaymentStatus};
use crate::entities::{cart_items, order_items, orders, transactions};

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: i32,
    pub color_id: i32,
    pub name: String,
    pub quantity: i32,
    pub price_at_time_of_order: i64,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i32,
    pub transaction_id: String,
    pub full_name: String,
    pub street: String,
    pub house_number: String,
    pub apartment_number: Option<String>,
    pub city: String,
    pub zip_code: String,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order: orders::Model,
    pub items: Vec<order_items::Model>,
}

/// Payment recorded when a checkout session completes.
#[derive(Debug, Clone)]
pub struct CompletedPayment {
    pub order_id: i32,
    pub user_id: i32,
    pub session_id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderStatistics {
    pub total_orders: u64,
    pub pending: u64,
    pub completed: u64,
    pub canceled: u64,
    pub dispatched: u64,
    pub awaiting_dispatch: u64,
    /// Sum of completed transactions in minor units
    pub revenue: i64,
}

pub struct OrderRepository {
    conn: DatabaseConnection,
}

impl OrderRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, new_order: NewOrder) -> Result<OrderRecord> {
        let now = chrono::Utc::now().to_rfc3339();
        let txn = self.conn.begin().await?;

        let order = orders::ActiveModel {
            user_id: Set(new_order.user_id),
            transaction_id: Set(new_order.transaction_id),
            payment_status: Set(PaymentStatus::Pending.as_str().to_string()),
            delivery_status: Set(DeliveryStatus::NotDispatched.as_str().to_string()),
            full_name: Set(new_order.full_name),
            street: Set(new_order.street),
            house_number: Set(new_order.house_number),
            apartment_number: Set(new_order.apartment_number),
            city: Set(new_order.city),
            zip_code: Set(new_order.zip_code),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .context("Failed to insert order")?;

        let mut items = Vec::with_capacity(new_order.items.len());
        for item in new_order.items {
            let model = order_items::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(item.product_id),
                color_id: Set(item.color_id),
                name: Set(item.name),
                quantity: Set(item.quantity),
                price_at_time_of_order: Set(item.price_at_time_of_order),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .context("Failed to insert order item")?;
            items.push(model);
        }

        txn.commit().await?;

        info!(order_id = order.id, user_id = order.user_id, "Created order");
        Ok(OrderRecord { order, items })
    }

    pub async fn get(&self, id: i32) -> Result<Option<OrderRecord>> {
        let order = orders::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query order by ID")?;

        let Some(order) = order else {
            return Ok(None);
        };

        let items = order_items::Entity::find()
            .filter(order_items::Column::OrderId.eq(order.id))
            .order_by_asc(order_items::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to query order items")?;

        Ok(Some(OrderRecord { order, items }))
    }

    pub async fn get_by_transaction(&self, session_id: &str) -> Result<Option<orders::Model>> {
        orders::Entity::find()
            .filter(orders::Column::TransactionId.eq(session_id))
            .one(&self.conn)
            .await
            .context("Failed to query order by transaction")
    }

    pub async fn items(&self, order_id: i32) -> Result<Vec<order_items::Model>> {
        order_items::Entity::find()
            .filter(order_items::Column::OrderId.eq(order_id))
            .order_by_asc(order_items::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to query order items")
    }

    pub async fn list_for_user(&self, user_id: i32) -> Result<Vec<OrderRecord>> {
        let rows = orders::Entity::find()
            .filter(orders::Column::UserId.eq(user_id))
            .order_by_desc(orders::Column::Id)
            .find_with_related(order_items::Entity)
            .all(&self.conn)
            .await
            .context("Failed to query orders for user")?;

        Ok(rows
            .into_iter()
            .map(|(order, items)| OrderRecord { order, items })
            .collect())
    }

    pub async fn list_page(&self, page: u64, limit: u64) -> Result<(Vec<OrderRecord>, u64)> {
        let total = orders::Entity::find()
            .count(&self.conn)
            .await
            .context("Failed to count orders")?;

        let rows = orders::Entity::find()
            .order_by_desc(orders::Column::Id)
            .offset(page.saturating_sub(1) * limit)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to query orders")?;

        let ids: Vec<i32> = rows.iter().map(|o| o.id).collect();
        let mut grouped: HashMap<i32, Vec<order_items::Model>> = HashMap::new();
        if !ids.is_empty() {
            let items = order_items::Entity::find()
                .filter(order_items::Column::OrderId.is_in(ids))
                .order_by_asc(order_items::Column::Id)
                .all(&self.conn)
                .await
                .context("Failed to query order items")?;
            for item in items {
                grouped.entry(item.order_id).or_default().push(item);
            }
        }

        Ok((
            rows.into_iter()
                .map(|order| {
                    let items = grouped.remove(&order.id).unwrap_or_default();
                    OrderRecord { order, items }
                })
                .collect(),
            total,
        ))
    }

    /// Flips a pending order to completed, records the transaction and empties
    /// the buyer's cart in one database transaction.
    ///
    /// Returns false when the order was no longer pending, so repeated
    /// webhook deliveries are no-ops.
    pub async fn complete_payment(&self, payment: CompletedPayment) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let txn = self.conn.begin().await?;

        let result = orders::Entity::update_many()
            .col_expr(
                orders::Column::PaymentStatus,
                Expr::value(PaymentStatus::Completed.as_str()),
            )
            .col_expr(orders::Column::UpdatedAt, Expr::value(now.clone()))
            .filter(orders::Column::Id.eq(payment.order_id))
            .filter(orders::Column::PaymentStatus.eq(PaymentStatus::Pending.as_str()))
            .exec(&txn)
            .await
            .context("Failed to mark order completed")?;

        if result.rows_affected == 0 {
            return Ok(false);
        }

        transactions::ActiveModel {
            user_id: Set(payment.user_id),
            order_id: Set(payment.order_id),
            session_id: Set(payment.session_id),
            amount: Set(payment.amount),
            currency: Set(payment.currency),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .context("Failed to insert transaction")?;

        cart_items::Entity::delete_many()
            .filter(cart_items::Column::UserId.eq(payment.user_id))
            .exec(&txn)
            .await
            .context("Failed to clear cart after payment")?;

        txn.commit().await?;
        Ok(true)
    }

    /// Cancels a pending order by its checkout session. Returns false when
    /// nothing was pending.
    pub async fn cancel_pending(&self, session_id: &str) -> Result<bool> {
        let result = orders::Entity::update_many()
            .col_expr(
                orders::Column::PaymentStatus,
                Expr::value(PaymentStatus::Canceled.as_str()),
            )
            .col_expr(
                orders::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(orders::Column::TransactionId.eq(session_id))
            .filter(orders::Column::PaymentStatus.eq(PaymentStatus::Pending.as_str()))
            .exec(&self.conn)
            .await
            .context("Failed to cancel order")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn set_delivery_status(&self, id: i32, status: DeliveryStatus) -> Result<()> {
        orders::Entity::update_many()
            .col_expr(orders::Column::DeliveryStatus, Expr::value(status.as_str()))
            .col_expr(
                orders::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(orders::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update delivery status")?;

        Ok(())
    }

    pub async fn statistics(&self) -> Result<OrderStatistics> {
        let total_orders = orders::Entity::find().count(&self.conn).await?;
        let pending = self.count_payment(PaymentStatus::Pending).await?;
        let completed = self.count_payment(PaymentStatus::Completed).await?;
        let canceled = self.count_payment(PaymentStatus::Canceled).await?;

        let dispatched = orders::Entity::find()
            .filter(orders::Column::DeliveryStatus.eq(DeliveryStatus::Dispatched.as_str()))
            .count(&self.conn)
            .await?;

        let awaiting_dispatch = orders::Entity::find()
            .filter(orders::Column::PaymentStatus.eq(PaymentStatus::Completed.as_str()))
            .filter(orders::Column::DeliveryStatus.eq(DeliveryStatus::NotDispatched.as_str()))
            .count(&self.conn)
            .await?;

        let revenue: Option<Option<i64>> = transactions::Entity::find()
            .select_only()
            .column_as(transactions::Column::Amount.sum(), "revenue")
            .into_tuple()
            .one(&self.conn)
            .await
            .context("Failed to sum transaction amounts")?;

        Ok(OrderStatistics {
            total_orders,
            pending,
            completed,
            canceled,
            dispatched,
            awaiting_dispatch,
            revenue: revenue.flatten().unwrap_or(0),
        })
    }

    async fn count_payment(&self, status: PaymentStatus) -> Result<u64> {
        orders::Entity::find()
            .filter(orders::Column::PaymentStatus.eq(status.as_str()))
            .count(&self.conn)
            .await
            .context("Failed to count orders by payment status")
    }
}
