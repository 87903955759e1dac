//! User links: grants of access to a route for users other than its creator.

use tracing::info;

use super::{Registry, RouteView, UserLink};
use crate::error::ApiError;

impl Registry {
    /// Link `user` to an existing route. Re-adding an existing link is a no-op.
    pub async fn add_user_link(&self, user: &str, uuid: &str) -> Result<RouteView, ApiError> {
        let mut state = self.state.write().await;

        let view = state
            .routes
            .get(uuid)
            .map(RouteView::from)
            .ok_or(ApiError::InvalidRouteUuid)?;

        if !state.is_linked(user, uuid) {
            let mut next = state.clone();
            next.links.push(UserLink {
                user: user.to_string(),
                route_uuid: uuid.to_string(),
            });
            self.commit(&mut state, next).await?;

            info!(uuid = %uuid, user = %user, "user_link_added");
        }

        Ok(view)
    }

    /// The route behind a link held by `user`.
    pub async fn get_user_link(&self, user: &str, uuid: &str) -> Result<RouteView, ApiError> {
        let state = self.state.read().await;

        if !state.is_linked(user, uuid) {
            return Err(ApiError::RouteLinkNotFound);
        }

        state
            .routes
            .get(uuid)
            .map(RouteView::from)
            .ok_or(ApiError::RouteLinkNotFound)
    }

    /// Remove a link. Removing a missing link succeeds.
    pub async fn remove_user_link(&self, user: &str, uuid: &str) -> Result<(), ApiError> {
        let mut state = self.state.write().await;

        if state.is_linked(user, uuid) {
            let mut next = state.clone();
            next
                .links
                .retain(|link| !(link.user == user && link.route_uuid == uuid));
            self.commit(&mut state, next).await?;
            info!(uuid = %uuid, user = %user, "user_link_removed");
        }

        Ok(())
    }

    /// Check that `user` may act on route `uuid`.
    ///
    /// An unknown route is `InvalidRouteUuid`; a known route without a link
    /// for `user` is `NotAuthorised`.
    pub async fn authorise(&self, user: &str, uuid: &str) -> Result<RouteView, ApiError> {
        let state = self.state.read().await;

        let route = state.routes.get(uuid).ok_or(ApiError::InvalidRouteUuid)?;

        if !state.is_linked(user, uuid) {
            return Err(ApiError::NotAuthorised);
        }

        Ok(RouteView::from(route))
    }
}
