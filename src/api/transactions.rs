use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Serialize;
use std::sync::Arc;

use super::auth::AuthUser;
use super::validation::validate_id;
use super::{ApiError, ApiResponse, AppState};
use crate::payments::stripe::{
    EVENT_ASYNC_PAYMENT_FAILED, EVENT_ASYNC_PAYMENT_SUCCEEDED, EVENT_CHECKOUT_COMPLETED,
    EVENT_CHECKOUT_EXPIRED, StripeCheckoutSession, StripeWebhookEvent,
};
use crate::payments::verify_webhook_signature;
use crate::services::order_service::TransactionView;
use crate::services::{CheckoutCompletion, CompletionOutcome};

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// POST /transactions/stripe/webhook
///
/// Takes the raw body since the signature covers the exact bytes sent.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, ApiError> {
    let stripe = &state.config().stripe;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::validation("Invalid webhook signature"))?;

    if let Err(e) = verify_webhook_signature(
        &stripe.webhook_secret,
        &body,
        signature,
        chrono::Utc::now().timestamp(),
        stripe.webhook_tolerance_seconds,
    ) {
        tracing::warn!(error = %e, "Rejected webhook");
        return Err(ApiError::validation("Invalid webhook signature"));
    }

    let event: StripeWebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation(format!("Invalid webhook payload: {e}")))?;

    match event.event_type.as_str() {
        EVENT_CHECKOUT_COMPLETED | EVENT_ASYNC_PAYMENT_SUCCEEDED => {
            let session = checkout_session(event.data.object)?;
            if session.is_paid() {
                complete_checkout(&state, session).await?;
            } else {
                tracing::info!(
                    session_id = %session.id,
                    payment_status = ?session.payment_status,
                    "Checkout awaiting payment"
                );
            }
        }
        EVENT_CHECKOUT_EXPIRED | EVENT_ASYNC_PAYMENT_FAILED => {
            let session = checkout_session(event.data.object)?;
            let canceled = state.order_service().cancel(&session.id).await?;
            tracing::info!(
                session_id = %session.id,
                event_type = %event.event_type,
                canceled,
                "Checkout not paid"
            );
        }
        other => {
            tracing::debug!(event_type = other, event_id = ?event.id, "Ignoring webhook event");
        }
    }

    Ok(Json(ApiResponse::success(WebhookAck { received: true })))
}

async fn complete_checkout(
    state: &AppState,
    session: StripeCheckoutSession,
) -> Result<(), ApiError> {
    let outcome = state
        .order_service()
        .complete(CheckoutCompletion {
            session_id: session.id.clone(),
            amount_total: session.amount_total,
            currency: session.currency,
        })
        .await?;

    match outcome {
        CompletionOutcome::Completed => {
            tracing::info!(session_id = %session.id, "Checkout completed");
        }
        CompletionOutcome::AlreadyProcessed => {
            tracing::debug!(session_id = %session.id, "Checkout already processed");
        }
        CompletionOutcome::UnknownSession => {
            tracing::warn!(session_id = %session.id, "Webhook for unknown checkout session");
        }
    }
    Ok(())
}

fn checkout_session(object: serde_json::Value) -> Result<StripeCheckoutSession, ApiError> {
    serde_json::from_value(object)
        .map_err(|e| ApiError::validation(format!("Invalid checkout session: {e}")))
}

/// GET /transactions/{user_id}
pub async fn list_for_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(user_id): Path<i32>,
) -> Result<Json<ApiResponse<Vec<TransactionView>>>, ApiError> {
    let user_id = validate_id("user", user_id)?;
    if user_id != user.id && !user.is_admin() {
        return Err(ApiError::forbidden(
            "Cannot view another user's transactions",
        ));
    }

    let transactions = state.order_service().transactions_for_user(user_id).await?;
    Ok(Json(ApiResponse::success(transactions)))
}
