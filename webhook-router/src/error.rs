//! Error taxonomy shared by the config and firewall servers.
//!
//! Every expected failure maps to a stable HTTP status and a numeric
//! `error_num` that clients (including the router) match on.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// `error_num` the router matches on to detect an unknown token.
pub const INVALID_ROUTE_TOKEN_ERROR: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid route UUID")]
    InvalidRouteUuid,

    #[error("Invalid route token")]
    InvalidRouteToken,

    #[error("Not Authorised")]
    NotAuthorised,

    #[error("Invalid URL in destination")]
    InvalidUrl,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Route link not found")]
    RouteLinkNotFound,

    #[error("Invalid firewall configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn error_num(&self) -> u32 {
        match self {
            ApiError::Internal(_) => 0,
            ApiError::InvalidRouteUuid => 1,
            ApiError::InvalidRouteToken => INVALID_ROUTE_TOKEN_ERROR,
            ApiError::NotAuthorised => 3,
            ApiError::InvalidUrl => 4,
            ApiError::InvalidCredentials(_) => 5,
            ApiError::RouteLinkNotFound => 6,
            ApiError::InvalidConfig(_) => 7,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRouteUuid
            | ApiError::InvalidRouteToken
            | ApiError::RouteLinkNotFound => StatusCode::NOT_FOUND,
            ApiError::NotAuthorised => StatusCode::FORBIDDEN,
            ApiError::InvalidUrl | ApiError::InvalidCredentials(_) | ApiError::InvalidConfig(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body returned for every `ApiError`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_num: u32,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            error!(error = %format!("{:#}", e), "internal_error");
        }

        let body = ErrorBody {
            error: self.to_string(),
            error_num: self.error_num(),
        };

        (self.status(), Json(body)).into_response()
    }
}
