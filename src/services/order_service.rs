//! Domain service for orders and their payment lifecycle.

use serde::Serialize;
use thiserror::Error;

use crate::db::{OrderRecord, OrderStatistics};
use crate::entities::transactions;
use crate::payments::PaymentError;
use crate::services::ProductError;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order {0} not found")]
    NotFound(i32),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product {0} is not available")]
    ProductUnavailable(i32),

    #[error("Insufficient stock for {name} ({color}): {available} left")]
    InsufficientStock {
        name: String,
        color: String,
        available: i32,
    },

    #[error("Order {0} is not paid")]
    NotPaid(i32),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Payment provider error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for OrderError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for OrderError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<ProductError> for OrderError {
    fn from(err: ProductError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Validated shipping details.
#[derive(Debug, Clone)]
pub struct ShippingDetails {
    pub full_name: String,
    pub street: String,
    pub house_number: String,
    pub apartment_number: Option<String>,
    pub city: String,
    pub zip_code: String,
}

#[derive(Debug, Clone)]
pub struct Buyer {
    pub user_id: i32,
    pub email: String,
}

/// Who is asking, for ownership checks.
#[derive(Debug, Clone, Copy)]
pub struct Requester {
    pub user_id: i32,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRedirect {
    pub url: String,
}

/// Payment details reported by the provider for a finished checkout.
#[derive(Debug, Clone)]
pub struct CheckoutCompletion {
    pub session_id: String,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed,
    AlreadyProcessed,
    UnknownSession,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemView {
    pub product_id: i32,
    pub color_id: i32,
    pub name: String,
    pub quantity: i32,
    pub price_at_time_of_order: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub id: i32,
    pub user_id: i32,
    pub transaction_id: String,
    pub payment_status: String,
    pub delivery_status: String,
    pub full_name: String,
    pub street: String,
    pub house_number: String,
    pub apartment_number: Option<String>,
    pub city: String,
    pub zip_code: String,
    pub items: Vec<OrderItemView>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<OrderRecord> for OrderView {
    fn from(record: OrderRecord) -> Self {
        let order = record.order;
        Self {
            id: order.id,
            user_id: order.user_id,
            transaction_id: order.transaction_id,
            payment_status: order.payment_status,
            delivery_status: order.delivery_status,
            full_name: order.full_name,
            street: order.street,
            house_number: order.house_number,
            apartment_number: order.apartment_number,
            city: order.city,
            zip_code: order.zip_code,
            items: record
                .items
                .into_iter()
                .map(|item| OrderItemView {
                    product_id: item.product_id,
                    color_id: item.color_id,
                    name: item.name,
                    quantity: item.quantity,
                    price_at_time_of_order: item.price_at_time_of_order,
                })
                .collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<OrderView>,
    pub page_count: u64,
    pub total_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub id: i32,
    pub user_id: i32,
    pub order_id: i32,
    pub session_id: String,
    pub amount: i64,
    pub currency: String,
    pub created_at: String,
}

impl From<transactions::Model> for TransactionView {
    fn from(model: transactions::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            order_id: model.order_id,
            session_id: model.session_id,
            amount: model.amount,
            currency: model.currency,
            created_at: model.created_at,
        }
    }
}

#[async_trait::async_trait]
pub trait OrderService: Send + Sync {
    /// Snapshots the buyer's cart into a pending order and opens a hosted
    /// checkout for it.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::EmptyCart`], a stock or availability error for
    /// any line that cannot be bought, or [`OrderError::Payment`] when the
    /// provider rejects the session.
    async fn create(
        &self,
        buyer: Buyer,
        shipping: ShippingDetails,
    ) -> Result<CheckoutRedirect, OrderError>;

    /// Marks the order behind a checkout session as paid. Safe to repeat.
    async fn complete(&self, completion: CheckoutCompletion)
    -> Result<CompletionOutcome, OrderError>;

    /// Cancels a still pending order whose checkout expired.
    async fn cancel(&self, session_id: &str) -> Result<bool, OrderError>;

    /// Marks a paid order as dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotPaid`] unless payment completed.
    async fn dispatch(&self, id: i32) -> Result<OrderView, OrderError>;

    /// Order visible to its owner or to an admin.
    async fn find_one(&self, id: i32, requester: Requester) -> Result<OrderView, OrderError>;

    async fn list_for_user(&self, user_id: i32) -> Result<Vec<OrderView>, OrderError>;

    async fn list_for_admin(&self, page: u64, limit: u64) -> Result<OrderPage, OrderError>;

    async fn statistics(&self) -> Result<OrderStatistics, OrderError>;

    async fn transactions_for_user(&self, user_id: i32)
    -> Result<Vec<TransactionView>, OrderError>;
}
