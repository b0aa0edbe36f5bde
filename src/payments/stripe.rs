use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;

use super::{CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway};
use crate::config::StripeConfig;

type HmacSha256 = Hmac<Sha256>;

/// Timestamps this far ahead of our clock are still accepted.
const FUTURE_SKEW_SECS: i64 = 60;

pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const EVENT_CHECKOUT_EXPIRED: &str = "checkout.session.expired";
pub const EVENT_ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";
pub const EVENT_ASYNC_PAYMENT_FAILED: &str = "checkout.session.async_payment_failed";

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| PaymentError::Request(e.to_string()))?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }
}

/// Flattens a checkout request into Stripe's bracketed form encoding.
#[must_use]
pub fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("customer_email".to_string(), request.customer_email.clone()),
        (
            "client_reference_id".to_string(),
            request.client_reference_id.clone(),
        ),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.push((
            format!("{prefix}[price_data][currency]"),
            request.currency.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount.to_string(),
        ));
        form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
    }

    let shipping = "shipping_options[0][shipping_rate_data]";
    form.push((format!("{shipping}[type]"), "fixed_amount".to_string()));
    form.push((
        format!("{shipping}[fixed_amount][amount]"),
        request.shipping_fee.to_string(),
    ));
    form.push((
        format!("{shipping}[fixed_amount][currency]"),
        request.currency.clone(),
    ));
    form.push((
        format!("{shipping}[display_name]"),
        request.shipping_label.clone(),
    ));

    form
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&checkout_form(&request))
            .send()
            .await
            .map_err(|e| PaymentError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let session: CreateCheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;

        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Malformed signature header")]
    Malformed,

    #[error("Signature timestamp outside tolerance (age {0}s)")]
    Stale(i64),

    #[error("Signature mismatch")]
    Mismatch,
}

/// Checks a `Stripe-Signature` header (`t=…,v1=…`) against the raw body.
///
/// The signed payload is `"{t}.{body}"` under HMAC-SHA256 with the endpoint
/// secret. Any `v1` entry may match, which covers secret rotation.
pub fn verify_webhook_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            signatures.push(s);
        }
    }

    let timestamp_str = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }

    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| SignatureError::Malformed)?;

    let age = now.checked_sub(timestamp).ok_or(SignatureError::Malformed)?;
    if age > tolerance_secs || age < -FUTURE_SKEW_SECS {
        return Err(SignatureError::Stale(age));
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp_str.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    let expected_bytes = expected.as_bytes();

    let matched = signatures.iter().any(|candidate| {
        let provided = candidate.as_bytes();
        provided.len() == expected_bytes.len() && bool::from(expected_bytes.ct_eq(provided))
    });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Generic Stripe webhook event, `data.object` is parsed per event type.
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
}

impl StripeCheckoutSession {
    /// Delayed payment methods complete the session before funds arrive.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid" | "no_payment_required")
        )
    }
}
