use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{delete, get, patch, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::payments::PaymentGateway;
use crate::services::{AuthService, CartService, Mailer, OrderService, ProductService, UserService};
use crate::state::SharedState;

pub mod auth;
pub mod cart;
mod error;
mod observability;
pub mod orders;
pub mod products;
mod system;
pub mod transactions;
mod types;
pub mod users;
mod validation;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn user_service(&self) -> &Arc<dyn UserService> {
        &self.shared.user_service
    }

    #[must_use]
    pub fn product_service(&self) -> &Arc<dyn ProductService> {
        &self.shared.product_service
    }

    #[must_use]
    pub fn cart_service(&self) -> &Arc<dyn CartService> {
        &self.shared.cart_service
    }

    #[must_use]
    pub fn order_service(&self) -> &Arc<dyn OrderService> {
        &self.shared.order_service
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

/// Same as [`create_app_state_from_config`] with caller supplied mail and
/// payment integrations.
pub async fn create_app_state_with(
    config: Config,
    mailer: Arc<dyn Mailer>,
    gateway: Arc<dyn PaymentGateway>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::with_integrations(config, mailer, gateway).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let (cors_origins, body_limit) = {
        let config = state.config();
        (
            config.server.cors_allowed_origins.clone(),
            config.server.body_limit_bytes,
        )
    };

    let api_router = Router::new()
        .merge(create_public_router())
        .merge(create_protected_router(state.clone()))
        .merge(create_admin_router(state.clone()))
        // Inside the nest so `MatchedPath` carries the route template
        .layer(middleware::from_fn(observability::logging_middleware))
        .with_state(state);

    let cors_layer = if cors_origins.iter().any(|origin| origin == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(
            cors_layer
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::PATCH,
                    axum::http::Method::DELETE,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ]),
        )
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
}

fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(system::health))
        .route("/metrics", get(observability::get_metrics))
        .route("/users", post(users::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/products", get(products::list_public))
        .route("/products/by-id/{id}", get(products::get_by_id))
        .route("/products/by-name/{name}", get(products::get_by_name))
        .route("/products/image/{id}", get(products::image))
        .route("/products/obj/{file}", get(products::model_file))
        .route(
            "/transactions/stripe/webhook",
            post(transactions::stripe_webhook),
        )
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/me", get(users::me))
        .route("/auth/logout", delete(auth::logout))
        .route("/auth/profile", get(auth::profile))
        .route(
            "/cart",
            get(cart::get_cart).patch(cart::add_item).delete(cart::clear),
        )
        .route(
            "/cart/items/{product_id}/{color_id}",
            delete(cart::remove_item),
        )
        .route("/orders", post(orders::create))
        .route("/orders/all", get(orders::list_mine))
        .route("/orders/find-by-id/{id}", get(orders::find_by_id))
        .route("/transactions/{user_id}", get(transactions::list_for_user))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

fn create_admin_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/products", post(products::create))
        .route("/products/admin", get(products::list_for_admin))
        .route(
            "/products/{id}",
            put(products::update).delete(products::remove),
        )
        .route("/orders/dispatch/{id}", patch(orders::dispatch))
        .route("/orders/for-admin", get(orders::list_for_admin))
        .route("/orders/statistics", get(orders::statistics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::admin_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
