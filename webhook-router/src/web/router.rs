//! Webhook relay endpoint.
//!
//! `/{token}` accepts every method so misdirected requests are still looked
//! up and logged, but only `POST` is forwarded.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde_json::json;
use tracing::{info, warn};

use crate::relay::{ConfigServerClient, Relay, RateLimiter, RelayError, RelayedResponse};
use crate::token::is_url_safe;

#[derive(Clone)]
pub struct RouterState {
    pub routes: ConfigServerClient,
    pub relay: Relay,
    pub limiter: Arc<RateLimiter>,
}

impl RouterState {
    pub fn new(routes: ConfigServerClient, relay: Relay) -> Self {
        Self {
            routes,
            relay,
            limiter: Arc::new(RateLimiter::new()),
        }
    }
}

pub fn router_routes() -> Router<RouterState> {
    Router::new()
        .route("/:token", any(relay_webhook))
        .fallback(not_found)
}

/// Relay an inbound webhook to the destination registered for `token`.
pub async fn relay_webhook(
    State(state): State<RouterState>,
    Path(token): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<RelayedResponse, RelayError> {
    if !is_url_safe(&token) {
        warn!(success = false, status_code = 400, "relay_invalid_token_format");
        return Err(RelayError::InvalidParameters);
    }

    let route = match state.routes.route_by_token(&token).await {
        Ok(route) => route,
        Err(e) => {
            warn!(
                success = false,
                status_code = e.status().as_u16(),
                error = %e,
                "route_lookup_failed"
            );
            return Err(e);
        }
    };

    if method != Method::POST {
        warn!(
            uuid = %route.uuid,
            destination = %route.destination,
            method = %method,
            success = false,
            status_code = 405,
            "relay_method_not_allowed"
        );
        return Err(RelayError::MethodNotAllowed(method));
    }

    if state.limiter.is_rate_limited(&route.uuid, route.rate_limit) {
        warn!(
            uuid = %route.uuid,
            destination = %route.destination,
            rate_limit = route.rate_limit,
            success = false,
            status_code = 503,
            "relay_rate_limited"
        );
        return Err(RelayError::TooManyRequests(route.rate_limit));
    }

    match state.relay.forward(&route, method, &headers, body).await {
        Ok(response) => {
            info!(
                uuid = %route.uuid,
                destination = %route.destination,
                status_code = response.status.as_u16(),
                success = true,
                "route_relayed"
            );
            Ok(response)
        }
        Err(e) => {
            warn!(
                uuid = %route.uuid,
                destination = %route.destination,
                status_code = e.status().as_u16(),
                error = %e,
                success = false,
                "route_relay_failed"
            );
            Err(e)
        }
    }
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "404 Not Found"})),
    )
        .into_response()
}
