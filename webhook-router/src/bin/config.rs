//! Config server: route and link management plus delivery statistics.

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::net::TcpListener;
use tracing::info;

use whr::auth::Authenticator;
use whr::config::CONFIG_SERVER_PORT;
use whr::stats::StatisticsQuerier;
use whr::telemetry::{init_logging, shutdown_signal};
use whr::web::{config_server_app, ConfigServerState};
use whr::{Config, Registry};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("config_server_starting");

    let config = Config::from_env(CONFIG_SERVER_PORT);
    info!(
        port = config.port,
        debug = config.debug,
        allowed_domain = ?config.allowed_domain,
        front_end = ?config.front_end,
        elasticsearch_url = %config.elasticsearch_url,
        store_path = ?config.store_path,
        "config_loaded"
    );

    let registry = match &config.store_path {
        Some(path) => Registry::open(path.clone()).await?,
        None => Registry::in_memory(),
    };

    let client = Client::new();
    let state = ConfigServerState::new(
        registry,
        Authenticator::from_config(&config, client.clone()),
        StatisticsQuerier::from_config(&config, client),
    );

    let app = config_server_app(state, config.front_end.as_deref());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(address = %addr, "config_server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal("config_server"))
        .await
        .context("Server error")?;

    info!("config_server_shutdown_complete");

    Ok(())
}
