//! Payment provider integration.

use async_trait::async_trait;
use thiserror::Error;

pub mod stripe;

pub use stripe::{StripeClient, verify_webhook_signature};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment provider request failed: {0}")]
    Request(String),

    #[error("Payment provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected payment provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLineItem {
    pub name: String,
    /// Price of one unit in minor units
    pub unit_amount: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub customer_email: String,
    pub client_reference_id: String,
    pub currency: String,
    pub line_items: Vec<CheckoutLineItem>,
    /// Flat shipping fee in minor units
    pub shipping_fee: i64,
    pub shipping_label: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Total charged, shipping included, in minor units.
    #[must_use]
    pub fn total_amount(&self) -> i64 {
        self.line_items
            .iter()
            .map(|item| item.unit_amount * i64::from(item.quantity))
            .sum::<i64>()
            + self.shipping_fee
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Creates hosted checkout pages.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;
}
