use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;
use crate::domain::{AssetKind, DeliveryStatus};
use crate::entities::{cart_items, order_items, orders, product_colors, products, refresh_tokens, transactions};

pub mod migrator;
pub mod repositories;

pub use repositories::order::{
    CompletedPayment, NewOrder, NewOrderItem, OrderRecord, OrderStatistics,
};
pub use repositories::product::{
    ColorInput, NewProduct, ProductChanges, ProductRecord, PublicListFilter, StockLine,
    StockUpdate,
};
pub use repositories::user::{NewUser, User};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let path_str = db_url.trim_start_matches("sqlite:").trim_start_matches("//");
        if !path_str.starts_with(":memory:") {
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn refresh_token_repo(&self) -> repositories::refresh_token::RefreshTokenRepository {
        repositories::refresh_token::RefreshTokenRepository::new(self.conn.clone())
    }

    fn product_repo(&self) -> repositories::product::ProductRepository {
        repositories::product::ProductRepository::new(self.conn.clone())
    }

    fn cart_repo(&self) -> repositories::cart::CartRepository {
        repositories::cart::CartRepository::new(self.conn.clone())
    }

    fn order_repo(&self) -> repositories::order::OrderRepository {
        repositories::order::OrderRepository::new(self.conn.clone())
    }

    fn transaction_repo(&self) -> repositories::transaction::TransactionRepository {
        repositories::transaction::TransactionRepository::new(self.conn.clone())
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        self.user_repo().email_exists(email).await
    }

    pub async fn create_user(&self, new_user: NewUser, config: &SecurityConfig) -> Result<User> {
        self.user_repo().create(new_user, config).await
    }

    pub async fn verify_user_password(&self, email: &str, password: &str) -> Result<Option<User>> {
        self.user_repo().verify_password(email, password).await
    }

    pub async fn user_password_hash(&self, id: i32) -> Result<Option<String>> {
        self.user_repo().password_hash(id).await
    }

    pub async fn activate_user(&self, id: i32) -> Result<bool> {
        self.user_repo().activate(id).await
    }

    /// Sets a new password and revokes all of the user's sessions.
    pub async fn reset_user_password(
        &self,
        id: i32,
        new_password: &str,
        config: &SecurityConfig,
    ) -> Result<u64> {
        self.user_repo().reset_password(id, new_password, config).await
    }

    pub async fn promote_to_admin(&self, id: i32) -> Result<()> {
        self.user_repo().promote_to_admin(id).await
    }

    // ========================================================================
    // Refresh tokens
    // ========================================================================

    pub async fn store_refresh_token(
        &self,
        user_id: i32,
        token: &str,
        jti: &str,
        expires_at: i64,
        max_active: u64,
        config: &SecurityConfig,
    ) -> Result<()> {
        self.refresh_token_repo()
            .create(user_id, token, jti, expires_at, max_active, config)
            .await
    }

    pub async fn find_valid_refresh_token(
        &self,
        jti: &str,
        token: &str,
        now: i64,
    ) -> Result<Option<refresh_tokens::Model>> {
        self.refresh_token_repo().find_valid(jti, token, now).await
    }

    pub async fn revoke_refresh_token(&self, jti: &str) -> Result<bool> {
        self.refresh_token_repo().revoke(jti).await
    }

    /// Live sessions of a user, closest to expiry first.
    pub async fn active_refresh_tokens(
        &self,
        user_id: i32,
        now: i64,
    ) -> Result<Vec<refresh_tokens::Model>> {
        self.refresh_token_repo().active_for_user(user_id, now).await
    }

    pub async fn delete_expired_refresh_tokens(&self, now: i64) -> Result<u64> {
        self.refresh_token_repo().delete_expired(now).await
    }

    // ========================================================================
    // Products
    // ========================================================================

    pub async fn list_public_products(
        &self,
        page: u64,
        limit: u64,
        filter: &PublicListFilter,
    ) -> Result<(Vec<(products::Model, Option<String>)>, u64)> {
        self.product_repo().list_public(page, limit, filter).await
    }

    pub async fn list_all_products(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<(products::Model, Vec<product_colors::Model>)>, u64)> {
        self.product_repo().list_all(page, limit).await
    }

    pub async fn get_product(&self, id: i32) -> Result<Option<ProductRecord>> {
        self.product_repo().get(id).await
    }

    pub async fn get_product_by_url(&self, url: &str) -> Result<Option<ProductRecord>> {
        self.product_repo().get_by_url(url).await
    }

    pub async fn get_product_row(&self, id: i32) -> Result<Option<products::Model>> {
        self.product_repo().get_model(id).await
    }

    pub async fn get_products(&self, ids: &[i32]) -> Result<HashMap<i32, products::Model>> {
        self.product_repo().find_many(ids).await
    }

    pub async fn get_colors(&self, ids: &[i32]) -> Result<HashMap<i32, product_colors::Model>> {
        self.product_repo().find_colors(ids).await
    }

    pub async fn get_product_color(
        &self,
        product_id: i32,
        color_id: i32,
    ) -> Result<Option<product_colors::Model>> {
        self.product_repo().color(product_id, color_id).await
    }

    pub async fn product_url_taken(&self, url: &str, except_id: Option<i32>) -> Result<bool> {
        self.product_repo().url_taken(url, except_id).await
    }

    pub async fn product_asset(&self, product_id: i32, kind: AssetKind) -> Result<Option<String>> {
        self.product_repo().asset(product_id, kind).await
    }

    pub async fn create_product(&self, new_product: NewProduct) -> Result<i32> {
        self.product_repo().create(new_product).await
    }

    pub async fn update_product(&self, id: i32, changes: ProductChanges) -> Result<bool> {
        self.product_repo().update(id, changes).await
    }

    pub async fn delete_product(&self, id: i32) -> Result<bool> {
        self.product_repo().delete(id).await
    }

    pub async fn decrease_stock(&self, lines: &[StockLine]) -> Result<Vec<StockUpdate>> {
        self.product_repo().decrease_stock(lines).await
    }

    // ========================================================================
    // Cart
    // ========================================================================

    pub async fn cart_items(&self, user_id: i32) -> Result<Vec<cart_items::Model>> {
        self.cart_repo().items(user_id).await
    }

    pub async fn add_cart_item(
        &self,
        user_id: i32,
        product_id: i32,
        color_id: i32,
        quantity: i32,
        max_quantity: i32,
    ) -> Result<cart_items::Model> {
        self.cart_repo()
            .add(user_id, product_id, color_id, quantity, max_quantity)
            .await
    }

    pub async fn remove_cart_item(
        &self,
        user_id: i32,
        product_id: i32,
        color_id: i32,
    ) -> Result<bool> {
        self.cart_repo()
            .remove_item(user_id, product_id, color_id)
            .await
    }

    pub async fn clear_cart(&self, user_id: i32) -> Result<u64> {
        self.cart_repo().clear(user_id).await
    }

    pub async fn remove_product_from_carts(&self, product_id: i32) -> Result<u64> {
        self.cart_repo().remove_product(product_id).await
    }

    pub async fn remove_color_from_carts(&self, product_id: i32, color_id: i32) -> Result<u64> {
        self.cart_repo().remove_color(product_id, color_id).await
    }

    // ========================================================================
    // Orders & transactions
    // ========================================================================

    pub async fn create_order(&self, new_order: NewOrder) -> Result<OrderRecord> {
        self.order_repo().create(new_order).await
    }

    pub async fn get_order(&self, id: i32) -> Result<Option<OrderRecord>> {
        self.order_repo().get(id).await
    }

    pub async fn get_order_by_transaction(&self, session_id: &str) -> Result<Option<orders::Model>> {
        self.order_repo().get_by_transaction(session_id).await
    }

    pub async fn order_items(&self, order_id: i32) -> Result<Vec<order_items::Model>> {
        self.order_repo().items(order_id).await
    }

    pub async fn list_orders_for_user(&self, user_id: i32) -> Result<Vec<OrderRecord>> {
        self.order_repo().list_for_user(user_id).await
    }

    pub async fn list_orders_page(&self, page: u64, limit: u64) -> Result<(Vec<OrderRecord>, u64)> {
        self.order_repo().list_page(page, limit).await
    }

    pub async fn complete_order_payment(&self, payment: CompletedPayment) -> Result<bool> {
        self.order_repo().complete_payment(payment).await
    }

    pub async fn cancel_pending_order(&self, session_id: &str) -> Result<bool> {
        self.order_repo().cancel_pending(session_id).await
    }

    pub async fn set_delivery_status(&self, id: i32, status: DeliveryStatus) -> Result<()> {
        self.order_repo().set_delivery_status(id, status).await
    }

    pub async fn order_statistics(&self) -> Result<OrderStatistics> {
        self.order_repo().statistics().await
    }

    pub async fn list_transactions_for_user(&self, user_id: i32) -> Result<Vec<transactions::Model>> {
        self.transaction_repo().list_for_user(user_id).await
    }

    pub async fn get_transaction_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<transactions::Model>> {
        self.transaction_repo().get_by_session(session_id).await
    }
}
