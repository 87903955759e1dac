//! Route registry record types.

use serde::{Deserialize, Serialize};

/// Requests per second allowed through a route unless configured otherwise.
pub const DEFAULT_RATE_LIMIT: u32 = 30;

/// A stored route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Auto-increment row id, never exposed
    pub id: u64,
    pub uuid: String,
    pub owner: String,
    pub name: String,
    pub destination: String,
    pub token: String,
    /// Indexed lookup prefix of `token`
    pub token_id: String,
    pub no_ssl_verification: bool,
    pub rate_limit: u32,
}

/// Public view of a route, returned to callers and to the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteView {
    pub uuid: String,
    pub owner: String,
    pub name: String,
    pub destination: String,
    pub token: String,
    pub token_id: String,
    pub no_ssl_verification: bool,
    pub rate_limit: u32,
}

impl From<&Route> for RouteView {
    fn from(route: &Route) -> Self {
        Self {
            uuid: route.uuid.clone(),
            owner: route.owner.clone(),
            name: route.name.clone(),
            destination: route.destination.clone(),
            token: route.token.clone(),
            token_id: route.token_id.clone(),
            no_ssl_verification: route.no_ssl_verification,
            rate_limit: route.rate_limit,
        }
    }
}

/// Grant of visibility into a route for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLink {
    pub user: String,
    pub route_uuid: String,
}

/// Body of a route creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRoute {
    pub name: String,
    pub destination: String,
    #[serde(default)]
    pub no_ssl_verification: bool,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
}

fn default_rate_limit() -> u32 {
    DEFAULT_RATE_LIMIT
}

/// Partial update of a route. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutePatch {
    pub name: Option<String>,
    pub destination: Option<String>,
    pub no_ssl_verification: Option<bool>,
    pub rate_limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_route_defaults() {
        let new: NewRoute =
            serde_json::from_str(r#"{"name": "route", "destination": "example.com"}"#).unwrap();
        assert!(!new.no_ssl_verification);
        assert_eq!(new.rate_limit, DEFAULT_RATE_LIMIT);
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let result: Result<RoutePatch, _> = serde_json::from_str(r#"{"token": "abc"}"#);
        assert!(result.is_err());

        let patch: RoutePatch = serde_json::from_str(r#"{"name": "new-name"}"#).unwrap();
        assert_eq!(patch.name.as_deref(), Some("new-name"));
        assert!(patch.destination.is_none());
    }

    #[test]
    fn test_route_view_omits_row_id() {
        let route = Route {
            id: 7,
            uuid: "u".into(),
            owner: "o".into(),
            name: "n".into(),
            destination: "http://127.0.0.1".into(),
            token: "t".into(),
            token_id: "t".into(),
            no_ssl_verification: false,
            rate_limit: 30,
        };

        let json = serde_json::to_value(RouteView::from(&route)).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["destination"], "http://127.0.0.1");
    }
}
