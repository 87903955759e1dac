//! Operation table for the config and firewall servers.
//!
//! Each HTTP operation is an `Operation` variant carrying whether it needs an
//! authenticated caller and which status it answers with on success. Handlers
//! run through [`despatch`], which authenticates, runs the operation, logs
//! the outcome and shapes the response.

use std::future::Future;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::auth::Authenticator;
use crate::error::ApiError;

/// Identity logged for operations that skip authentication.
pub const ANONYMOUS: &str = "<NONE>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateRoute,
    GetAllRoutes,
    GetRoute,
    GetByToken,
    PatchRoute,
    DeleteRoute,
    RegenerateToken,
    AddRouteLink,
    GetRouteLink,
    DeleteRouteLink,
    GetRouteStatistics,
    GetRouteLogs,
    GetAllRoutesStatistics,
    GetConfig,
    SetConfig,
    IsAdmin,
    IsUrlValid,
}

impl Operation {
    pub const fn name(self) -> &'static str {
        match self {
            Operation::CreateRoute => "create_route",
            Operation::GetAllRoutes => "get_all_routes",
            Operation::GetRoute => "get_route",
            Operation::GetByToken => "get_by_token",
            Operation::PatchRoute => "patch_route",
            Operation::DeleteRoute => "delete_route",
            Operation::RegenerateToken => "regenerate_token",
            Operation::AddRouteLink => "add_route_link",
            Operation::GetRouteLink => "get_route_link",
            Operation::DeleteRouteLink => "delete_route_link",
            Operation::GetRouteStatistics => "get_route_statistics",
            Operation::GetRouteLogs => "get_route_logs",
            Operation::GetAllRoutesStatistics => "get_all_routes_statistics",
            Operation::GetConfig => "get_config",
            Operation::SetConfig => "set_config",
            Operation::IsAdmin => "is_admin",
            Operation::IsUrlValid => "is_url_valid",
        }
    }

    /// Token lookup is called by the router and URL validation by the
    /// config server, neither on behalf of a user.
    pub const fn requires_auth(self) -> bool {
        !matches!(self, Operation::GetByToken | Operation::IsUrlValid)
    }

    pub const fn success_status(self) -> StatusCode {
        match self {
            Operation::CreateRoute | Operation::AddRouteLink => StatusCode::CREATED,
            Operation::PatchRoute
            | Operation::DeleteRoute
            | Operation::DeleteRouteLink
            | Operation::SetConfig => StatusCode::NO_CONTENT,
            _ => StatusCode::OK,
        }
    }
}

/// Authenticate (when required), run `handler` with the caller's identity,
/// log the outcome and build the response.
pub async fn despatch<T, F, Fut>(
    auth: &Authenticator,
    operation: Operation,
    headers: &HeaderMap,
    handler: F,
) -> Response
where
    T: Serialize,
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let (user, result) = if operation.requires_auth() {
        match auth.authenticate(headers).await {
            Ok(user) => {
                let result = handler(user.clone()).await;
                (user, result)
            }
            Err(e) => (ANONYMOUS.to_string(), Err(e)),
        }
    } else {
        (ANONYMOUS.to_string(), handler(ANONYMOUS.to_string()).await)
    };

    match result {
        Ok(value) => {
            let status = operation.success_status();
            info!(
                operation = operation.name(),
                user = %user,
                status_code = status.as_u16(),
                "operation_handled"
            );

            if status == StatusCode::NO_CONTENT {
                status.into_response()
            } else {
                (status, Json(value)).into_response()
            }
        }
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                error!(
                    operation = operation.name(),
                    user = %user,
                    status_code = status.as_u16(),
                    error = %e,
                    "operation_failed"
                );
            } else {
                warn!(
                    operation = operation.name(),
                    user = %user,
                    status_code = status.as_u16(),
                    error = %e,
                    "operation_rejected"
                );
            }
            e.into_response()
        }
    }
}
