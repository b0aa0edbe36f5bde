use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::payments::{PaymentGateway, StripeClient};
use crate::services::{
    AuthService, CartService, LogMailer, Mailer, OrderService, ProductService, SeaOrmAuthService,
    SeaOrmCartService, SeaOrmOrderService, SeaOrmProductService, SeaOrmUserService, SmtpMailer,
    TokenService, UserService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub auth_service: Arc<dyn AuthService>,

    pub user_service: Arc<dyn UserService>,

    pub product_service: Arc<dyn ProductService>,

    pub cart_service: Arc<dyn CartService>,

    pub order_service: Arc<dyn OrderService>,
}

impl SharedState {
    /// Builds the state with the SMTP relay (or the logging mailer when mail
    /// is disabled) and the Stripe client.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let mailer: Arc<dyn Mailer> = if config.mail.enabled {
            Arc::new(
                SmtpMailer::new(&config.mail, &config.server.client_url)
                    .map_err(|e| anyhow::anyhow!("Failed to configure mailer: {e}"))?,
            )
        } else {
            Arc::new(LogMailer::new(&config.server.client_url))
        };

        let gateway: Arc<dyn PaymentGateway> = Arc::new(
            StripeClient::new(&config.stripe)
                .map_err(|e| anyhow::anyhow!("Failed to build Stripe client: {e}"))?,
        );

        Self::with_integrations(config, mailer, gateway).await
    }

    pub async fn with_integrations(
        config: Config,
        mailer: Arc<dyn Mailer>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_url,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let tokens = TokenService::new(&config.auth);
        let config = Arc::new(config);

        let auth_service = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            tokens.clone(),
            config.clone(),
        )) as Arc<dyn AuthService>;

        let user_service = Arc::new(SeaOrmUserService::new(
            store.clone(),
            tokens,
            mailer,
            config.clone(),
        )) as Arc<dyn UserService>;

        let product_service =
            Arc::new(SeaOrmProductService::new(store.clone())) as Arc<dyn ProductService>;

        let cart_service = Arc::new(SeaOrmCartService::new(store.clone())) as Arc<dyn CartService>;

        let order_service = Arc::new(SeaOrmOrderService::new(
            store.clone(),
            gateway,
            product_service.clone(),
            config.clone(),
        )) as Arc<dyn OrderService>;

        Ok(Self {
            config,
            store,
            auth_service,
            user_service,
            product_service,
            cart_service,
            order_service,
        })
    }

    /// Seeds the configured admin account, if any.
    pub async fn bootstrap_admin(&self) -> anyhow::Result<()> {
        let bootstrap = &self.config.bootstrap;
        if let (Some(email), Some(password)) = (&bootstrap.admin_email, &bootstrap.admin_password)
        {
            let admin = self
                .user_service
                .ensure_admin(email, password)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to bootstrap admin: {e}"))?;
            tracing::info!(user_id = admin.id, "Admin account ready");
        }
        Ok(())
    }
}
