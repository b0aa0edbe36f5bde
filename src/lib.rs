pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod entities;
pub mod payments;
pub mod services;
pub mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
pub use config::Config;
use db::Store;
use services::Scheduler;
use state::SharedState;

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.command() == &Commands::Init {
        if Config::create_default_if_missing()? {
            println!("Created config.toml, edit it and run again.");
        } else {
            println!("config.toml already exists");
        }
        return Ok(());
    }

    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.general.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    init_tracing(&config.general.log_level, config.general.json_logs);
    if prometheus_handle.is_some() {
        info!("Prometheus metrics recorder initialized");
    }

    match cli.command() {
        Commands::SweepTokens => sweep_tokens(&config).await,
        Commands::Serve | Commands::Init => serve(config, prometheus_handle).await,
    }
}

fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn sweep_tokens(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_url).await?;
    let deleted = services::scheduler::sweep_refresh_tokens(&store).await?;
    info!(deleted, "Expired refresh tokens removed");
    Ok(())
}

async fn serve(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!("Shopfront v{} starting...", env!("CARGO_PKG_VERSION"));

    let port = config.server.port;
    let scheduler_config = config.scheduler.clone();

    let shared = Arc::new(SharedState::new(config).await?);
    shared.bootstrap_admin().await?;

    let mut scheduler = Scheduler::new(shared.store.clone(), scheduler_config);
    scheduler.start().await?;
    if scheduler.is_running() {
        info!("Scheduler started");
    }

    let api_state = api::create_app_state(shared, prometheus_handle);
    let app = api::router(api_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Web server running at http://{addr}");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Web server error: {e}");
    }

    if let Err(e) = scheduler.stop().await {
        error!("Failed to stop scheduler: {e}");
    }
    info!("Shopfront stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Error listening for shutdown: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("Error installing SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
