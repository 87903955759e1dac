//! Firewall config server.
//!
//! Serves the destination allow-rules, lets admins replace them and answers
//! whether a URL may be relayed to.

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::net::TcpListener;
use tracing::info;

use whr::auth::Authenticator;
use whr::config::FIREWALL_PORT;
use whr::firewall::ConfigSource;
use whr::telemetry::{init_logging, shutdown_signal};
use whr::web::{firewall_app, FirewallState};
use whr::{Config, FirewallValidator};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("firewall_starting");

    let config = Config::from_env(FIREWALL_PORT);
    info!(
        port = config.port,
        debug = config.debug,
        firewall_config_path = %config.firewall_config_path.display(),
        front_end = ?config.front_end,
        "config_loaded"
    );

    let validator = FirewallValidator::load(ConfigSource::File(config.firewall_config_path.clone()))
        .await
        .with_context(|| {
            format!(
                "Failed to load firewall config from {}",
                config.firewall_config_path.display()
            )
        })?;

    let state = FirewallState::new(validator, Authenticator::from_config(&config, Client::new()));
    let app = firewall_app(state, config.front_end.as_deref());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(address = %addr, "firewall_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal("firewall"))
        .await
        .context("Server error")?;

    info!("firewall_shutdown_complete");

    Ok(())
}
