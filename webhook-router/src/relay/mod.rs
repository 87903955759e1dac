//! Webhook relay: forwards an inbound request to a route's destination and
//! hands the upstream response back unchanged.
//!
//! There is no retry and no circuit breaking. The upstream call is bounded by
//! the configured timeout; a timeout or transport error is a relay failure.

pub mod client;
pub mod rate_limit;

use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Client;
use serde::Serialize;
use tracing::warn;

use crate::registry::RouteView;

pub use client::ConfigServerClient;
pub use rate_limit::RateLimiter;

/// Headers that describe a single hop and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid token, it contains non URL safe characters")]
    InvalidParameters,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Incorrect http method {0}, only POST requests are supported")]
    MethodNotAllowed(Method),

    #[error("Too many requests issued, only {0} requests are allowed per second")]
    TooManyRequests(u32),

    #[error("Config server error: {0}")]
    ConfigServer(String),

    #[error("Routing error: {0}")]
    Upstream(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidParameters => StatusCode::BAD_REQUEST,
            RelayError::InvalidToken => StatusCode::NOT_FOUND,
            RelayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::TooManyRequests(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::ConfigServer(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Serialize)]
struct RelayErrorBody {
    error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let line = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Error")
        );
        (status, Json(RelayErrorBody { error: line })).into_response()
    }
}

/// Upstream response, passed back verbatim.
#[derive(Debug)]
pub struct RelayedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for RelayedResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

/// Outbound side of the relay.
#[derive(Debug, Clone)]
pub struct Relay {
    client: Client,
    /// Used for routes that opt out of certificate verification
    insecure_client: Client,
    warning_delay: Duration,
}

impl Relay {
    pub fn new(timeout: Duration, warning_delay: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to create HTTP client")?;

        let insecure_client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            insecure_client,
            warning_delay,
        })
    }

    /// Forward a request to `route.destination` with the same method,
    /// headers and body.
    pub async fn forward(
        &self,
        route: &RouteView,
        method: Method,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<RelayedResponse, RelayError> {
        let client = if route.no_ssl_verification {
            &self.insecure_client
        } else {
            &self.client
        };

        let request = client
            .request(method, &route.destination)
            .headers(strip_hop_by_hop(headers))
            .body(body);

        let send = request.send();
        tokio::pin!(send);

        let result = tokio::select! {
            result = &mut send => result,
            _ = tokio::time::sleep(self.warning_delay) => {
                warn!(
                    uuid = %route.uuid,
                    destination = %route.destination,
                    warning_delay_seconds = self.warning_delay.as_secs_f64(),
                    "relay_long_running"
                );
                send.await
            }
        };

        let response = result.map_err(|e| {
            if e.is_timeout() {
                RelayError::Upstream(format!("timed out: {}", e))
            } else {
                RelayError::Upstream(e.to_string())
            }
        })?;

        let status = response.status();
        let headers = strip_hop_by_hop(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| RelayError::Upstream(e.to_string()))?;

        Ok(RelayedResponse {
            status,
            headers,
            body,
        })
    }
}

/// Copy of `headers` without hop-by-hop headers.
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(*name);
    }
    out
}
