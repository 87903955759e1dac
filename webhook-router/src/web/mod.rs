//! HTTP surfaces for the three services.
//!
//! Each service gets an app builder that mounts its routes next to
//! `GET /health` and wraps them in request tracing. The config and firewall
//! servers additionally allow the configured front end origin.

pub mod config_server;
pub mod firewall;
pub mod operations;
pub mod router;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

pub use config_server::{config_server_routes, ConfigServerState};
pub use firewall::{firewall_routes, FirewallState};
pub use operations::{despatch, Operation};
pub use router::{router_routes, RouterState};

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub fn router_app(state: RouterState) -> Router {
    // `/health` is static, so it wins over `/:token`
    Router::new()
        .route("/health", get(health))
        .merge(router_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn config_server_app(state: ConfigServerState, front_end: Option<&str>) -> Router {
    with_cors(
        Router::new()
            .route("/health", get(health))
            .merge(config_server_routes()),
        front_end,
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

pub fn firewall_app(state: FirewallState, front_end: Option<&str>) -> Router {
    with_cors(
        Router::new()
            .route("/health", get(health))
            .merge(firewall_routes()),
        front_end,
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

fn with_cors<S>(router: Router<S>, front_end: Option<&str>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    match front_end.map(cors_layer) {
        Some(Some(cors)) => router.layer(cors),
        _ => router,
    }
}

/// CORS policy admitting `origin`, or `None` when it is not a valid header
/// value.
pub fn cors_layer(origin: &str) -> Option<CorsLayer> {
    let origin = match HeaderValue::from_str(origin) {
        Ok(value) => value,
        Err(e) => {
            warn!(origin = %origin, error = %e, "cors_origin_invalid");
            return None;
        }
    };

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    )
}
