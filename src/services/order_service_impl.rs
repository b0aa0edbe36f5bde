//! `SeaORM` implementation of the `OrderService` trait.

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{CompletedPayment, NewOrder, NewOrderItem, OrderStatistics, Store};
use crate::domain::{DeliveryStatus, PaymentStatus};
use crate::entities::order_items;
use crate::payments::{CheckoutLineItem, CheckoutRequest, PaymentGateway};
use crate::services::order_service::{
    Buyer, CheckoutCompletion, CheckoutRedirect, CompletionOutcome, OrderError, OrderPage,
    OrderService, OrderView, Requester, ShippingDetails, TransactionView,
};
use crate::services::product_service::{MAX_ADMIN_PAGE_SIZE, ProductService, StockRequest};
use crate::services::product_service_impl::page_count;

const STATISTICS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Prices are stored in whole units, the provider expects minor units.
const MINOR_UNITS: i64 = 100;

pub struct SeaOrmOrderService {
    store: Store,
    gateway: Arc<dyn PaymentGateway>,
    products: Arc<dyn ProductService>,
    config: Arc<Config>,
    statistics: Cache<(), OrderStatistics>,
}

impl SeaOrmOrderService {
    #[must_use]
    pub fn new(
        store: Store,
        gateway: Arc<dyn PaymentGateway>,
        products: Arc<dyn ProductService>,
        config: Arc<Config>,
    ) -> Self {
        let statistics = Cache::builder()
            .max_capacity(1)
            .time_to_live(STATISTICS_TTL)
            .build();

        Self {
            store,
            gateway,
            products,
            config,
            statistics,
        }
    }

    async fn load(&self, id: i32) -> Result<OrderView, OrderError> {
        self.store
            .get_order(id)
            .await?
            .map(OrderView::from)
            .ok_or(OrderError::NotFound(id))
    }
}

/// Amount charged for an order in minor units, shipping included.
#[must_use]
pub fn order_total(items: &[order_items::Model], shipping_fee: i64) -> i64 {
    items
        .iter()
        .map(|item| item.price_at_time_of_order * MINOR_UNITS * i64::from(item.quantity))
        .sum::<i64>()
        + shipping_fee
}

#[async_trait]
impl OrderService for SeaOrmOrderService {
    async fn create(
        &self,
        buyer: Buyer,
        shipping: ShippingDetails,
    ) -> Result<CheckoutRedirect, OrderError> {
        let lines = self.store.cart_items(buyer.user_id).await?;
        if lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let product_ids: Vec<i32> = lines.iter().map(|l| l.product_id).collect();
        let color_ids: Vec<i32> = lines.iter().map(|l| l.color_id).collect();
        let products = self.store.get_products(&product_ids).await?;
        let colors = self.store.get_colors(&color_ids).await?;

        let mut line_items = Vec::with_capacity(lines.len());
        let mut items = Vec::with_capacity(lines.len());

        for line in &lines {
            let product = products
                .get(&line.product_id)
                .filter(|p| p.public)
                .ok_or(OrderError::ProductUnavailable(line.product_id))?;
            let color = colors
                .get(&line.color_id)
                .filter(|c| c.product_id == product.id)
                .ok_or(OrderError::ProductUnavailable(line.product_id))?;

            if color.stock < line.quantity {
                return Err(OrderError::InsufficientStock {
                    name: product.name.clone(),
                    color: color.name.clone(),
                    available: color.stock,
                });
            }

            line_items.push(CheckoutLineItem {
                name: format!("{} ({})", product.name, color.name),
                unit_amount: product.price * MINOR_UNITS,
                quantity: line.quantity,
            });
            items.push(NewOrderItem {
                product_id: product.id,
                color_id: color.id,
                name: product.name.clone(),
                quantity: line.quantity,
                price_at_time_of_order: product.price,
            });
        }

        let client_url = &self.config.server.client_url;
        let session = self
            .gateway
            .create_checkout_session(CheckoutRequest {
                customer_email: buyer.email,
                client_reference_id: buyer.user_id.to_string(),
                currency: self.config.stripe.currency.clone(),
                line_items,
                shipping_fee: self.config.stripe.shipping_fee,
                shipping_label: self.config.stripe.shipping_label.clone(),
                success_url: format!("{client_url}/home"),
                cancel_url: format!("{client_url}/store/checkout"),
            })
            .await?;

        let record = self
            .store
            .create_order(NewOrder {
                user_id: buyer.user_id,
                transaction_id: session.id,
                full_name: shipping.full_name,
                street: shipping.street,
                house_number: shipping.house_number,
                apartment_number: shipping.apartment_number,
                city: shipping.city,
                zip_code: shipping.zip_code,
                items,
            })
            .await?;

        self.statistics.invalidate(&()).await;

        info!(
            order_id = record.order.id,
            user_id = buyer.user_id,
            "Checkout session created"
        );
        Ok(CheckoutRedirect { url: session.url })
    }

    async fn complete(
        &self,
        completion: CheckoutCompletion,
    ) -> Result<CompletionOutcome, OrderError> {
        let Some(order) = self
            .store
            .get_order_by_transaction(&completion.session_id)
            .await?
        else {
            warn!(session_id = %completion.session_id, "Completed checkout has no matching order");
            return Ok(CompletionOutcome::UnknownSession);
        };

        if order.payment_status != PaymentStatus::Pending.as_str()
            || self
                .store
                .get_transaction_by_session(&completion.session_id)
                .await?
                .is_some()
        {
            info!(order_id = order.id, status = %order.payment_status, "Order already processed");
            return Ok(CompletionOutcome::AlreadyProcessed);
        }

        let items = self.store.order_items(order.id).await?;
        let amount = completion
            .amount_total
            .unwrap_or_else(|| order_total(&items, self.config.stripe.shipping_fee));
        let currency = completion
            .currency
            .unwrap_or_else(|| self.config.stripe.currency.clone());

        let applied = self
            .store
            .complete_order_payment(CompletedPayment {
                order_id: order.id,
                user_id: order.user_id,
                session_id: completion.session_id,
                amount,
                currency,
            })
            .await?;

        if !applied {
            return Ok(CompletionOutcome::AlreadyProcessed);
        }

        let stock: Vec<StockRequest> = items
            .iter()
            .map(|item| StockRequest {
                product_id: item.product_id,
                color_id: item.color_id,
                quantity: item.quantity,
            })
            .collect();

        // Payment is final at this point; a shortfall needs manual follow-up.
        match self.products.decrease_stock(&stock).await {
            Ok(shortfalls) => {
                for shortfall in shortfalls {
                    warn!(
                        order_id = order.id,
                        product_id = shortfall.product_id,
                        color_id = shortfall.color_id,
                        requested = shortfall.requested,
                        available = shortfall.available,
                        "Paid order line short of stock"
                    );
                }
            }
            Err(e) => {
                warn!(order_id = order.id, error = %e, "Could not decrement stock for paid order");
            }
        }

        self.statistics.invalidate(&()).await;

        info!(order_id = order.id, user_id = order.user_id, amount, "Order paid");
        Ok(CompletionOutcome::Completed)
    }

    async fn cancel(&self, session_id: &str) -> Result<bool, OrderError> {
        let canceled = self.store.cancel_pending_order(session_id).await?;
        if canceled {
            self.statistics.invalidate(&()).await;
            info!(session_id, "Order canceled after checkout expiry");
        }
        Ok(canceled)
    }

    async fn dispatch(&self, id: i32) -> Result<OrderView, OrderError> {
        let order = self.load(id).await?;

        if order.payment_status != PaymentStatus::Completed.as_str() {
            return Err(OrderError::NotPaid(id));
        }

        if order.delivery_status == DeliveryStatus::Dispatched.as_str() {
            return Ok(order);
        }

        self.store
            .set_delivery_status(id, DeliveryStatus::Dispatched)
            .await?;
        self.statistics.invalidate(&()).await;

        info!(order_id = id, "Order dispatched");
        self.load(id).await
    }

    async fn find_one(&self, id: i32, requester: Requester) -> Result<OrderView, OrderError> {
        let order = self.load(id).await?;
        if order.user_id != requester.user_id && !requester.is_admin {
            return Err(OrderError::NotFound(id));
        }
        Ok(order)
    }

    async fn list_for_user(&self, user_id: i32) -> Result<Vec<OrderView>, OrderError> {
        let records = self.store.list_orders_for_user(user_id).await?;
        Ok(records.into_iter().map(OrderView::from).collect())
    }

    async fn list_for_admin(&self, page: u64, limit: u64) -> Result<OrderPage, OrderError> {
        if page == 0 {
            return Err(OrderError::Validation("page must be at least 1".to_string()));
        }
        if limit == 0 || limit > MAX_ADMIN_PAGE_SIZE {
            return Err(OrderError::Validation(format!(
                "limit must be between 1 and {MAX_ADMIN_PAGE_SIZE}"
            )));
        }

        let (records, total) = self.store.list_orders_page(page, limit).await?;

        Ok(OrderPage {
            orders: records.into_iter().map(OrderView::from).collect(),
            page_count: page_count(total, limit),
            total_count: total,
        })
    }

    async fn statistics(&self) -> Result<OrderStatistics, OrderError> {
        let store = self.store.clone();
        self.statistics
            .try_get_with((), async move { store.order_statistics().await })
            .await
            .map_err(|e| OrderError::Internal(e.to_string()))
    }

    async fn transactions_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<TransactionView>, OrderError> {
        let rows = self.store.list_transactions_for_user(user_id).await?;
        Ok(rows.into_iter().map(TransactionView::from).collect())
    }
}
