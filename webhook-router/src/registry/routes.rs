//! Route registration, lookup, update, token regeneration and deletion.
//!
//! These operations do not check who is calling; the config server
//! authorises against the link table before it gets here.

use tracing::info;
use url::Url;

use super::{NewRoute, Registry, RegistryState, Route, RoutePatch, RouteView, UserLink};
use crate::error::ApiError;
use crate::token::{constant_time_compare, generate_token, token_id};

/// Normalize a destination URL.
///
/// A destination without a scheme gets `http://` prepended. The result must
/// parse as an absolute `http` or `https` URL with a host.
pub fn normalize_destination(raw: &str) -> Result<String, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::InvalidUrl);
    }

    let candidate = if has_scheme(raw) {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };

    let url = Url::parse(&candidate).map_err(|_| ApiError::InvalidUrl)?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ApiError::InvalidUrl);
    }

    Ok(candidate)
}

/// Whether `raw` starts with `scheme://`, ignoring any `://` that only
/// appears in its path, query or fragment.
fn has_scheme(raw: &str) -> bool {
    let authority_end = raw.find(['/', '?', '#']).unwrap_or(raw.len());
    raw.find("://").is_some_and(|at| at < authority_end)
}

impl Registry {
    /// Register a new route owned by `owner` and link it to them.
    pub async fn create_route(&self, owner: &str, new: NewRoute) -> Result<RouteView, ApiError> {
        let destination = normalize_destination(&new.destination)?;
        let pair = generate_token();

        let mut state = self.state.write().await;
        let mut next = state.clone();
        next.next_id += 1;

        let route = Route {
            id: next.next_id,
            uuid: uuid::Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            name: new.name,
            destination,
            token: pair.token,
            token_id: pair.token_id,
            no_ssl_verification: new.no_ssl_verification,
            rate_limit: new.rate_limit,
        };
        let view = RouteView::from(&route);

        next.index_token(&route.token_id, &route.uuid);
        next.links.push(UserLink {
            user: owner.to_string(),
            route_uuid: route.uuid.clone(),
        });
        next.routes.insert(route.uuid.clone(), route);

        self.commit(&mut state, next).await?;

        info!(
            uuid = %view.uuid,
            owner = %owner,
            destination = %view.destination,
            "route_created"
        );

        Ok(view)
    }

    /// Fetch a route by uuid.
    pub async fn get(&self, uuid: &str) -> Result<RouteView, ApiError> {
        let state = self.state.read().await;
        state
            .routes
            .get(uuid)
            .map(RouteView::from)
            .ok_or(ApiError::InvalidRouteUuid)
    }

    /// Resolve a full token to its route.
    ///
    /// The prefix must match exactly one stored route; zero or several
    /// candidates are both treated as an invalid token. The full token is
    /// then compared in constant time.
    pub async fn get_by_token(&self, token: &str) -> Result<RouteView, ApiError> {
        let prefix = token_id(token).ok_or(ApiError::InvalidRouteToken)?;

        let state = self.state.read().await;
        let candidates = state
            .token_index
            .get(prefix)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let [uuid] = candidates else {
            return Err(ApiError::InvalidRouteToken);
        };

        let route = state.routes.get(uuid).ok_or(ApiError::InvalidRouteToken)?;

        if !constant_time_compare(&route.token, token) {
            return Err(ApiError::InvalidRouteToken);
        }

        Ok(RouteView::from(route))
    }

    /// Apply the provided fields of `patch` to a route.
    pub async fn update(&self, uuid: &str, patch: RoutePatch) -> Result<(), ApiError> {
        let destination = patch
            .destination
            .as_deref()
            .map(normalize_destination)
            .transpose()?;

        let mut state = self.state.write().await;
        let mut next = state.clone();
        let route = next
            .routes
            .get_mut(uuid)
            .ok_or(ApiError::InvalidRouteUuid)?;

        if let Some(name) = patch.name {
            route.name = name;
        }
        if let Some(destination) = destination {
            route.destination = destination;
        }
        if let Some(no_ssl_verification) = patch.no_ssl_verification {
            route.no_ssl_verification = no_ssl_verification;
        }
        if let Some(rate_limit) = patch.rate_limit {
            route.rate_limit = rate_limit;
        }

        self.commit(&mut state, next).await?;

        info!(uuid = %uuid, "route_updated");

        Ok(())
    }

    /// Replace a route's token. The old token stops resolving immediately.
    pub async fn regenerate_token(&self, uuid: &str) -> Result<RouteView, ApiError> {
        let mut state = self.state.write().await;

        let route = state
            .routes
            .get(uuid)
            .ok_or(ApiError::InvalidRouteUuid)?;
        let old_token_id = route.token_id.clone();

        // A collision with the current token would keep it valid
        let pair = loop {
            let pair = generate_token();
            if pair.token != route.token {
                break pair;
            }
        };

        let mut next = state.clone();
        next.unindex_token(&old_token_id, uuid);
        next.index_token(&pair.token_id, uuid);

        let view = match next.routes.get_mut(uuid) {
            Some(route) => {
                route.token = pair.token;
                route.token_id = pair.token_id;
                RouteView::from(&*route)
            }
            None => return Err(ApiError::InvalidRouteUuid),
        };

        self.commit(&mut state, next).await?;

        info!(uuid = %uuid, "route_token_regenerated");

        Ok(view)
    }

    /// Delete a route and every link to it. Deleting an unknown route succeeds.
    pub async fn delete(&self, uuid: &str) -> Result<(), ApiError> {
        let mut state = self.state.write().await;
        self.remove_route(&mut state, uuid).await
    }

    /// Delete a route on behalf of `user`, who must hold a link to it.
    ///
    /// The link check and the removal happen under one write guard. An
    /// unknown route succeeds without any check.
    pub async fn delete_if_linked(&self, user: &str, uuid: &str) -> Result<(), ApiError> {
        let mut state = self.state.write().await;

        if !state.routes.contains_key(uuid) {
            return Ok(());
        }
        if !state.is_linked(user, uuid) {
            return Err(ApiError::NotAuthorised);
        }

        self.remove_route(&mut state, uuid).await
    }

    async fn remove_route(&self, state: &mut RegistryState, uuid: &str) -> Result<(), ApiError> {
        let mut next = state.clone();
        let Some(route) = next.routes.remove(uuid) else {
            return Ok(());
        };

        next.unindex_token(&route.token_id, uuid);
        next.links.retain(|link| link.route_uuid != uuid);

        self.commit(state, next).await?;

        info!(uuid = %uuid, "route_deleted");

        Ok(())
    }

    /// Routes visible to `user`, in creation order.
    pub async fn routes_for_user(&self, user: &str) -> Vec<RouteView> {
        let state = self.state.read().await;

        let mut routes: Vec<&Route> = state
            .links
            .iter()
            .filter(|link| link.user == user)
            .filter_map(|link| state.routes.get(&link.route_uuid))
            .collect();
        routes.sort_by_key(|route| route.id);
        routes.dedup_by_key(|route| route.id);

        routes.into_iter().map(RouteView::from).collect()
    }
}
