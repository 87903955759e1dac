//! Config server endpoints: route and link CRUD plus delivery statistics.
//!
//! Authorization is link based: a caller may act on a route only while they
//! hold a link to it. Creating a route links it to its creator, and anyone
//! who knows a route's uuid may link themselves to it.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
    routing::{get, post},
    Json, Router,
};

use crate::auth::Authenticator;
use crate::error::ApiError;
use crate::registry::{NewRoute, Registry, RoutePatch};
use crate::stats::StatisticsQuerier;
use crate::web::operations::{despatch, Operation};

/// Shared config server state.
#[derive(Clone)]
pub struct ConfigServerState {
    pub registry: Arc<Registry>,
    pub auth: Arc<Authenticator>,
    pub stats: StatisticsQuerier,
}

impl ConfigServerState {
    pub fn new(registry: Registry, auth: Authenticator, stats: StatisticsQuerier) -> Self {
        Self {
            registry: Arc::new(registry),
            auth: Arc::new(auth),
            stats,
        }
    }
}

/// Operation-to-handler table for the config server.
pub fn config_server_routes() -> Router<ConfigServerState> {
    Router::new()
        .route("/create-route", post(create_route))
        .route("/add-route", post(create_route))
        .route("/routes", get(get_all_routes))
        .route("/routes/statistics", get(get_all_routes_statistics))
        .route("/routes/token/:token", get(get_by_token))
        .route(
            "/routes/:uuid",
            get(get_route).patch(patch_route).delete(delete_route),
        )
        .route("/routes/:uuid/regenerate", post(regenerate_token))
        .route("/routes/:uuid/statistics", get(get_route_statistics))
        .route("/routes/:uuid/logs", get(get_route_logs))
        .route(
            "/links/:uuid",
            get(get_route_link)
                .post(add_route_link)
                .delete(delete_route_link),
        )
}

pub async fn create_route(
    State(state): State<ConfigServerState>,
    headers: HeaderMap,
    Json(new_route): Json<NewRoute>,
) -> Response {
    let registry = &state.registry;
    despatch(&state.auth, Operation::CreateRoute, &headers, |user| async move {
        registry.create_route(&user, new_route).await
    })
    .await
}

pub async fn get_all_routes(State(state): State<ConfigServerState>, headers: HeaderMap) -> Response {
    let registry = &state.registry;
    despatch(&state.auth, Operation::GetAllRoutes, &headers, |user| async move {
        Ok::<_, ApiError>(registry.routes_for_user(&user).await)
    })
    .await
}

pub async fn get_route(
    State(state): State<ConfigServerState>,
    headers: HeaderMap,
    Path(uuid): Path<String>,
) -> Response {
    let registry = &state.registry;
    despatch(&state.auth, Operation::GetRoute, &headers, |user| async move {
        registry.authorise(&user, &uuid).await
    })
    .await
}

pub async fn get_by_token(
    State(state): State<ConfigServerState>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Response {
    let registry = &state.registry;
    despatch(&state.auth, Operation::GetByToken, &headers, |_| async move {
        registry.get_by_token(&token).await
    })
    .await
}

pub async fn patch_route(
    State(state): State<ConfigServerState>,
    headers: HeaderMap,
    Path(uuid): Path<String>,
    Json(patch): Json<RoutePatch>,
) -> Response {
    let registry = &state.registry;
    despatch(&state.auth, Operation::PatchRoute, &headers, |user| async move {
        registry.authorise(&user, &uuid).await?;
        registry.update(&uuid, patch).await
    })
    .await
}

pub async fn delete_route(
    State(state): State<ConfigServerState>,
    headers: HeaderMap,
    Path(uuid): Path<String>,
) -> Response {
    let registry = &state.registry;
    despatch(&state.auth, Operation::DeleteRoute, &headers, |user| async move {
        registry.delete_if_linked(&user, &uuid).await
    })
    .await
}

pub async fn regenerate_token(
    State(state): State<ConfigServerState>,
    headers: HeaderMap,
    Path(uuid): Path<String>,
) -> Response {
    let registry = &state.registry;
    despatch(&state.auth, Operation::RegenerateToken, &headers, |user| async move {
        registry.authorise(&user, &uuid).await?;
        registry.regenerate_token(&uuid).await
    })
    .await
}

pub async fn add_route_link(
    State(state): State<ConfigServerState>,
    headers: HeaderMap,
    Path(uuid): Path<String>,
) -> Response {
    let registry = &state.registry;
    despatch(&state.auth, Operation::AddRouteLink, &headers, |user| async move {
        registry.add_user_link(&user, &uuid).await
    })
    .await
}

pub async fn get_route_link(
    State(state): State<ConfigServerState>,
    headers: HeaderMap,
    Path(uuid): Path<String>,
) -> Response {
    let registry = &state.registry;
    despatch(&state.auth, Operation::GetRouteLink, &headers, |user| async move {
        registry.get_user_link(&user, &uuid).await
    })
    .await
}

pub async fn delete_route_link(
    State(state): State<ConfigServerState>,
    headers: HeaderMap,
    Path(uuid): Path<String>,
) -> Response {
    let registry = &state.registry;
    despatch(&state.auth, Operation::DeleteRouteLink, &headers, |user| async move {
        registry.remove_user_link(&user, &uuid).await
    })
    .await
}

pub async fn get_route_statistics(
    State(state): State<ConfigServerState>,
    headers: HeaderMap,
    Path(uuid): Path<String>,
) -> Response {
    let registry = &state.registry;
    let stats = &state.stats;
    despatch(&state.auth, Operation::GetRouteStatistics, &headers, |user| async move {
        registry.authorise(&user, &uuid).await?;
        Ok::<_, ApiError>(stats.route_stats(&uuid).await?)
    })
    .await
}

pub async fn get_route_logs(
    State(state): State<ConfigServerState>,
    headers: HeaderMap,
    Path(uuid): Path<String>,
) -> Response {
    let registry = &state.registry;
    let stats = &state.stats;
    despatch(&state.auth, Operation::GetRouteLogs, &headers, |user| async move {
        registry.authorise(&user, &uuid).await?;
        Ok::<_, ApiError>(stats.route_logs(&uuid).await?)
    })
    .await
}

pub async fn get_all_routes_statistics(
    State(state): State<ConfigServerState>,
    headers: HeaderMap,
) -> Response {
    let registry = &state.registry;
    let stats = &state.stats;
    despatch(&state.auth, Operation::GetAllRoutesStatistics, &headers, |user| async move {
        let uuids: Vec<String> = registry
            .routes_for_user(&user)
            .await
            .into_iter()
            .map(|route| route.uuid)
            .collect();
        Ok::<_, ApiError>(stats.many_routes_stats(&uuids).await?)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use reqwest::Client;
    use serde_json::{json, Value};
    use tower::ServiceExt; // For oneshot()
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::registry::RouteView;

    const OWNER: &str = "test_user@example.com";
    const OTHER: &str = "other_user@example.com";

    fn app_with_stats(stats_url: String) -> Router {
        let state = ConfigServerState::new(
            Registry::in_memory(),
            Authenticator::Debug {
                default_user: OWNER.into(),
            },
            StatisticsQuerier::new(Client::new(), stats_url, "whr_routing_server"),
        );
        config_server_routes().with_state(state)
    }

    fn app() -> Router {
        app_with_stats("http://127.0.0.1:9".into())
    }

    async fn send(app: &Router, method: &str, uri: &str, user: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header("user", user);
        let body = match body {
            Some(value) => {
                request = request.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create(app: &Router) -> RouteView {
        let (status, body) = send(
            app,
            "POST",
            "/create-route",
            OWNER,
            Some(json!({"name": "route", "destination": "127.0.0.1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn test_create_route() {
        let app = app();
        let route = create(&app).await;
        assert_eq!(route.destination, "http://127.0.0.1");
        assert_eq!(route.rate_limit, 30);
        assert!(!route.no_ssl_verification);
    }

    #[tokio::test]
    async fn test_add_route_alias() {
        let app = app();
        let (status, _) = send(
            &app,
            "POST",
            "/add-route",
            OWNER,
            Some(json!({"name": "route", "destination": "https://127.0.0.1", "rate_limit": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_create_route_invalid_url() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/create-route",
            OWNER,
            Some(json!({"name": "route", "destination": "ftp://127.0.0.1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_num"], 4);
    }

    #[tokio::test]
    async fn test_get_and_get_by_token() {
        let app = app();
        let route = create(&app).await;

        let (status, body) = send(&app, "GET", &format!("/routes/{}", route.uuid), OWNER, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token"], route.token.as_str());

        let (status, body) = send(&app, "GET", &format!("/routes/token/{}", route.token), "", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["uuid"], route.uuid.as_str());

        let (status, body) = send(&app, "GET", "/routes/token/doesnotexistatall", "", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_num"], 2);
    }

    #[tokio::test]
    async fn test_get_unknown_and_unlinked() {
        let app = app();
        let route = create(&app).await;

        let (status, body) = send(&app, "GET", "/routes/not-a-route", OWNER, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_num"], 1);

        let (status, body) = send(&app, "GET", &format!("/routes/{}", route.uuid), OTHER, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error_num"], 3);
    }

    #[tokio::test]
    async fn test_patch() {
        let app = app();
        let route = create(&app).await;
        let uri = format!("/routes/{}", route.uuid);

        let (status, _) = send(&app, "PATCH", &uri, OWNER, Some(json!({"name": "new-name"}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(&app, "GET", &uri, OWNER, None).await;
        assert_eq!(body["name"], "new-name");
        assert_eq!(body["destination"], "http://127.0.0.1");
    }

    #[tokio::test]
    async fn test_get_all() {
        let app = app();
        create(&app).await;

        let (status, body) = send(&app, "GET", "/routes", OWNER, None).await;
        assert_eq!(status, StatusCode::OK);
        let routes = body.as_array().unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0]["name"], "route");

        let (_, body) = send(&app, "GET", "/routes", OTHER, None).await;
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let app = app();
        let route = create(&app).await;
        let uri = format!("/routes/{}", route.uuid);

        let (status, _) = send(&app, "DELETE", &uri, OWNER, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "DELETE", &uri, OWNER, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "GET", &uri, OWNER, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_requires_link() {
        let app = app();
        let route = create(&app).await;
        let uri = format!("/routes/{}", route.uuid);

        let (status, _) = send(&app, "DELETE", &uri, OTHER, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, "GET", &uri, OWNER, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_regenerate() {
        let app = app();
        let route = create(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/routes/{}/regenerate", route.uuid),
            OWNER,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(body["token"], route.token.as_str());

        let (status, _) = send(&app, "GET", &format!("/routes/token/{}", route.token), "", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_user_links() {
        let app = app();
        let route = create(&app).await;
        let uri = format!("/links/{}", route.uuid);

        let (status, _) = send(&app, "GET", &uri, OTHER, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "GET", &uri, OWNER, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "POST", &uri, OTHER, None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["uuid"], route.uuid.as_str());

        let (_, body) = send(&app, "GET", "/routes", OTHER, None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "DELETE", &uri, OTHER, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "DELETE", &uri, OTHER, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(&app, "GET", "/routes", OTHER, None).await;
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_link_to_unknown_route() {
        let app = app();
        let (status, body) = send(&app, "POST", "/links/not-a-route", OTHER, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_num"], 1);
    }

    #[tokio::test]
    async fn test_route_statistics_and_logs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/whr_routing_server/_count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 2})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/whr_routing_server/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {"hits": [{"_source": {"success": false}}]}
            })))
            .mount(&server)
            .await;

        let app = app_with_stats(server.uri());
        let route = create(&app).await;

        let (status, body) = send(
            &app,
            "GET",
            &format!("/routes/{}/statistics", route.uuid),
            OWNER,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"successes": 2, "failures": 2}));

        let (status, body) = send(&app, "GET", &format!("/routes/{}/logs", route.uuid), OWNER, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_all_routes_statistics_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/whr_routing_server/_msearch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responses": [
                    {"hits": {"total": 1}},
                    {"hits": {"total": 2}},
                    {"hits": {"total": 3}},
                    {"hits": {"total": 4}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let app = app_with_stats(server.uri());
        let first = create(&app).await;
        let second = create(&app).await;

        let (status, body) = send(&app, "GET", "/routes/statistics", OWNER, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([
                {"uuid": first.uuid, "successes": 1, "failures": 2},
                {"uuid": second.uuid, "successes": 3, "failures": 4}
            ])
        );
    }

    #[tokio::test]
    async fn test_all_routes_statistics_with_no_routes() {
        let app = app();
        let (status, body) = send(&app, "GET", "/routes/statistics", OWNER, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_statistics_store_down_is_internal_error() {
        let app = app();
        let route = create(&app).await;

        let (status, body) = send(
            &app,
            "GET",
            &format!("/routes/{}/statistics", route.uuid),
            OWNER,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error_num"], 0);
    }
}
