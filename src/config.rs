use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub auth: AuthConfig,

    pub security: SecurityConfig,

    pub stripe: StripeConfig,

    pub mail: MailConfig,

    pub scheduler: SchedulerConfig,

    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_url: String,

    pub log_level: String,

    /// Emit logs as JSON lines instead of the human readable format.
    pub json_logs: bool,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,

    pub metrics_enabled: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/shopfront.db".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on the refresh token cookie.
    /// Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// Upper bound for request bodies, product uploads included.
    pub body_limit_bytes: usize,

    /// Storefront origin used in payment redirects and email links.
    pub client_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            secure_cookies: true,
            body_limit_bytes: 50 * 1024 * 1024,
            client_url: "http://localhost:5173".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,

    pub jwt_refresh_secret: String,

    /// Signs email verification and password reset links.
    pub jwt_mail_secret: String,

    pub access_token_ttl_minutes: u64,

    pub refresh_token_ttl_days: u64,

    pub verify_token_ttl_hours: u64,

    pub reset_token_ttl_minutes: u64,

    /// Active refresh tokens kept per user; the one expiring first is evicted.
    pub max_active_refresh_tokens: u64,

    /// Reject logins for accounts that never confirmed their email.
    pub require_activation: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_refresh_secret: String::new(),
            jwt_mail_secret: String::new(),
            access_token_ttl_minutes: 10,
            refresh_token_ttl_days: 30,
            verify_token_ttl_hours: 24,
            reset_token_ttl_minutes: 60,
            max_active_refresh_tokens: 3,
            require_activation: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StripeConfig {
    pub secret_key: String,

    pub webhook_secret: String,

    pub api_base: String,

    pub currency: String,

    /// Flat shipping fee in minor units (grosze for PLN).
    pub shipping_fee: i64,

    pub shipping_label: String,

    /// Maximum accepted age of a webhook signature timestamp.
    pub webhook_tolerance_seconds: i64,

    pub request_timeout_seconds: u64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: String::new(),
            api_base: "https://api.stripe.com".to_string(),
            currency: "pln".to_string(),
            shipping_fee: 1100,
            shipping_label: "Courier delivery".to_string(),
            webhook_tolerance_seconds: 300,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// When disabled, outgoing mail is written to the log instead.
    pub enabled: bool,

    pub smtp_host: String,

    pub smtp_port: u16,

    pub smtp_username: String,

    pub smtp_password: String,

    pub from_address: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: "Shopfront <no-reply@shopfront.local>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    /// Six-field cron expression for the expired refresh token sweep.
    pub refresh_token_sweep_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_token_sweep_cron: "0 0 0 */7 * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub admin_email: Option<String>,

    pub admin_password: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::load_file()?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        info!("Config saved to: {}", path.display());
        Ok(())
    }

    /// Overlays deployment settings taken from the environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.general.database_url = url;
        }
        if let Some(level) = lookup("RUST_LOG") {
            self.general.log_level = level;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT value: {port}"))?;
        }
        if let Some(url) = lookup("CLIENT_URL") {
            self.server.client_url = url.trim_end_matches('/').to_string();
        }

        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(secret) = lookup("JWT_REFRESH_SECRET") {
            self.auth.jwt_refresh_secret = secret;
        }
        if let Some(secret) = lookup("JWT_MAIL_SECRET") {
            self.auth.jwt_mail_secret = secret;
        }

        if let Some(key) = lookup("STRIPE_SECRET_KEY") {
            self.stripe.secret_key = key;
        }
        if let Some(secret) = lookup("STRIPE_WEBHOOK_SECRET") {
            self.stripe.webhook_secret = secret;
        }

        if let Some(host) = lookup("SMTP_HOST") {
            self.mail.smtp_host = host;
            self.mail.enabled = true;
        }
        if let Some(username) = lookup("SMTP_USERNAME") {
            self.mail.smtp_username = username;
        }
        if let Some(password) = lookup("SMTP_PASSWORD") {
            self.mail.smtp_password = password;
        }
        if let Some(from) = lookup("MAIL_FROM") {
            self.mail.from_address = from;
        }

        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("shopfront").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".shopfront").join("config.toml"));
        }

        paths
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = PathBuf::from("config.toml");
        if path.exists() {
            Ok(false)
        } else {
            Self::default().save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!("JWT_SECRET must be set");
        }
        if self.auth.jwt_refresh_secret.is_empty() {
            anyhow::bail!("JWT_REFRESH_SECRET must be set");
        }
        if self.auth.jwt_mail_secret.is_empty() {
            anyhow::bail!("JWT_MAIL_SECRET must be set");
        }
        if self.auth.max_active_refresh_tokens == 0 {
            anyhow::bail!("auth.max_active_refresh_tokens must be > 0");
        }
        if self.stripe.shipping_fee < 0 {
            anyhow::bail!("stripe.shipping_fee cannot be negative");
        }
        if self.mail.enabled && self.mail.smtp_host.is_empty() {
            anyhow::bail!("SMTP host cannot be empty when mail is enabled");
        }

        Ok(())
    }
}
