//! Token resolution through the config server.

use reqwest::{Client, StatusCode};
use tracing::warn;

use super::RelayError;
use crate::error::{ErrorBody, INVALID_ROUTE_TOKEN_ERROR};
use crate::registry::RouteView;

/// Client for the config server's token lookup endpoint.
#[derive(Debug, Clone)]
pub struct ConfigServerClient {
    client: Client,
    base_url: String,
}

impl ConfigServerClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Resolve `token` to its route.
    ///
    /// Only a 404 carrying the invalid-token error code means the token is
    /// unknown; any other failure is reported as a config server error.
    pub async fn route_by_token(&self, token: &str) -> Result<RouteView, RelayError> {
        let url = format!("{}/routes/token/{}", self.base_url, token);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RelayError::ConfigServer(e.to_string()))?;

        let status = response.status();

        if status == StatusCode::OK {
            return response
                .json::<RouteView>()
                .await
                .map_err(|e| RelayError::ConfigServer(format!("malformed route: {}", e)));
        }

        let body = response.json::<ErrorBody>().await.ok();

        if status == StatusCode::NOT_FOUND
            && body.as_ref().map(|b| b.error_num) == Some(INVALID_ROUTE_TOKEN_ERROR)
        {
            return Err(RelayError::InvalidToken);
        }

        let message = body
            .map(|b| b.error)
            .unwrap_or_else(|| format!("unexpected status {}", status));
        warn!(status_code = status.as_u16(), error = %message, "config_server_lookup_failed");

        Err(RelayError::ConfigServer(message))
    }
}
