//! Firewall config server endpoints.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::Authenticator;
use crate::error::ApiError;
use crate::firewall::{FirewallConfig, FirewallValidator};
use crate::web::operations::{despatch, Operation};

#[derive(Clone)]
pub struct FirewallState {
    pub validator: Arc<FirewallValidator>,
    pub auth: Arc<Authenticator>,
}

impl FirewallState {
    pub fn new(validator: FirewallValidator, auth: Authenticator) -> Self {
        Self {
            validator: Arc::new(validator),
            auth: Arc::new(auth),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    pub url: String,
}

pub fn firewall_routes() -> Router<FirewallState> {
    Router::new()
        .route("/config", get(get_config).put(set_config))
        .route("/amIAdmin", get(am_i_admin))
        .route("/isUrlValid", get(is_url_valid))
}

pub async fn get_config(State(state): State<FirewallState>, headers: HeaderMap) -> Response {
    let validator = &state.validator;
    despatch(&state.auth, Operation::GetConfig, &headers, |user| async move {
        let config = validator.snapshot();
        if !config.is_admin(&user) {
            return Err(ApiError::NotAuthorised);
        }
        Ok(FirewallConfig::clone(&config))
    })
    .await
}

/// Replace the whole rule set. The body is validated before anything is
/// persisted.
pub async fn set_config(
    State(state): State<FirewallState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let validator = &state.validator;
    despatch(&state.auth, Operation::SetConfig, &headers, |user| async move {
        if !validator.is_admin(&user) {
            return Err(ApiError::NotAuthorised);
        }
        let config = FirewallConfig::from_value(body)?;
        validator.set_config(config).await
    })
    .await
}

pub async fn am_i_admin(State(state): State<FirewallState>, headers: HeaderMap) -> Response {
    let validator = &state.validator;
    despatch(&state.auth, Operation::IsAdmin, &headers, |user| async move {
        Ok::<_, ApiError>(validator.is_admin(&user))
    })
    .await
}

pub async fn is_url_valid(
    State(state): State<FirewallState>,
    headers: HeaderMap,
    Query(query): Query<UrlQuery>,
) -> Response {
    let validator = &state.validator;
    despatch(&state.auth, Operation::IsUrlValid, &headers, |_| async move {
        Ok::<_, ApiError>(validator.is_url_valid(&query.url).await)
    })
    .await
}
