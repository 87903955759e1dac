//! Webhook relay server.
//!
//! Resolves `POST /{token}` through the config server and forwards the
//! request to the route's destination, handing the response straight back.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::net::TcpListener;
use tracing::info;

use whr::config::ROUTER_PORT;
use whr::relay::ConfigServerClient;
use whr::telemetry::{init_logging, shutdown_signal};
use whr::web::{router_app, RouterState};
use whr::{Config, Relay};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("router_starting");

    let config = Config::from_env(ROUTER_PORT);
    info!(
        port = config.port,
        config_server_url = %config.config_server_url,
        relay_timeout_ms = config.relay_timeout_ms,
        warning_delay_ms = config.warning_delay_ms,
        "config_loaded"
    );

    let relay = Relay::new(
        Duration::from_millis(config.relay_timeout_ms),
        Duration::from_millis(config.warning_delay_ms),
    )?;
    let routes = ConfigServerClient::new(Client::new(), config.config_server_url.clone());

    let app = router_app(RouterState::new(routes, relay));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(address = %addr, "router_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal("router"))
        .await
        .context("Server error")?;

    info!("router_shutdown_complete");

    Ok(())
}
