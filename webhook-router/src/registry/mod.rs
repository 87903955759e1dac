//! Route registry: routes, their tokens, and the user links that grant access.
//!
//! The registry is an in-process store behind an async `RwLock`. Every
//! read-modify-write runs under the write guard, so registration, token
//! regeneration and updates are atomic per route. Mutations are built on a
//! copy of the state and only replace it once the snapshot (when a path is
//! configured) has been written, so a failed write changes nothing.

pub mod links;
pub mod models;
pub mod routes;

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

pub use models::{NewRoute, Route, RoutePatch, RouteView, UserLink, DEFAULT_RATE_LIMIT};
pub use routes::normalize_destination;

/// Persisted registry contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryState {
    next_id: u64,
    routes: HashMap<String, Route>,
    links: Vec<UserLink>,
    /// token_id -> route uuids, rebuilt on load
    #[serde(skip)]
    token_index: HashMap<String, Vec<String>>,
}

impl RegistryState {
    fn rebuild_index(&mut self) {
        self.token_index.clear();
        for route in self.routes.values() {
            self.token_index
                .entry(route.token_id.clone())
                .or_default()
                .push(route.uuid.clone());
        }
    }

    fn index_token(&mut self, token_id: &str, uuid: &str) {
        self.token_index
            .entry(token_id.to_string())
            .or_default()
            .push(uuid.to_string());
    }

    fn is_linked(&self, user: &str, uuid: &str) -> bool {
        self.links
            .iter()
            .any(|link| link.user == user && link.route_uuid == uuid)
    }

    fn unindex_token(&mut self, token_id: &str, uuid: &str) {
        if let Some(uuids) = self.token_index.get_mut(token_id) {
            uuids.retain(|u| u != uuid);
            if uuids.is_empty() {
                self.token_index.remove(token_id);
            }
        }
    }
}

/// Shared route registry.
#[derive(Debug)]
pub struct Registry {
    state: RwLock<RegistryState>,
    snapshot_path: Option<PathBuf>,
}

impl Registry {
    /// Registry that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            snapshot_path: None,
        }
    }

    /// Open a registry backed by a JSON snapshot, loading it when present.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let mut state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<RegistryState>(&bytes)
                .with_context(|| format!("Failed to parse registry snapshot {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryState::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read registry snapshot {}", path.display()))
            }
        };
        state.rebuild_index();

        info!(
            path = %path.display(),
            routes = state.routes.len(),
            links = state.links.len(),
            "registry_loaded"
        );

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    /// Persist `next` and make it the live state.
    ///
    /// `current` must be the write guard's contents; it is left untouched
    /// when persisting fails.
    async fn commit(&self, current: &mut RegistryState, next: RegistryState) -> Result<()> {
        self.persist(&next).await?;
        *current = next;
        Ok(())
    }

    /// Write the snapshot while the caller still holds the write guard.
    async fn persist(&self, state: &RegistryState) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let body = serde_json::to_vec(state).context("Failed to serialize registry")?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("whr-{}-{}.json", name, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_open_missing_snapshot_is_empty() {
        let path = temp_path("missing");
        let registry = Registry::open(path).await.unwrap();
        assert!(registry.routes_for_user("anyone@example.com").await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let path = temp_path("snapshot");

        let created = {
            let registry = Registry::open(path.clone()).await.unwrap();
            registry
                .create_route(
                    "owner@example.com",
                    NewRoute {
                        name: "route".into(),
                        destination: "127.0.0.1:9000".into(),
                        no_ssl_verification: false,
                        rate_limit: DEFAULT_RATE_LIMIT,
                    },
                )
                .await
                .unwrap()
        };

        let reopened = Registry::open(path.clone()).await.unwrap();
        assert_eq!(reopened.get(&created.uuid).await.unwrap(), created);
        // The token index is rebuilt from the snapshot
        assert_eq!(reopened.get_by_token(&created.token).await.unwrap(), created);
        assert_eq!(reopened.routes_for_user("owner@example.com").await.len(), 1);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_unchanged() {
        let dir = std::env::temp_dir().join(format!("whr-missing-{}", uuid::Uuid::new_v4()));
        let registry = Registry::open(dir.join("store.json")).await.unwrap();

        let result = registry
            .create_route(
                "owner@example.com",
                NewRoute {
                    name: "route".into(),
                    destination: "127.0.0.1:9000".into(),
                    no_ssl_verification: false,
                    rate_limit: DEFAULT_RATE_LIMIT,
                },
            )
            .await;

        assert!(matches!(result, Err(crate::error::ApiError::Internal(_))));
        assert!(registry.routes_for_user("owner@example.com").await.is_empty());
        let state = registry.state.read().await;
        assert!(state.routes.is_empty());
        assert!(state.token_index.is_empty());
        assert_eq!(state.next_id, 0);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_existing_route() {
        let dir = std::env::temp_dir().join(format!("whr-vanishing-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir(&dir).unwrap();
        let registry = Registry::open(dir.join("store.json")).await.unwrap();

        let route = registry
            .create_route(
                "owner@example.com",
                NewRoute {
                    name: "route".into(),
                    destination: "127.0.0.1:9000".into(),
                    no_ssl_verification: false,
                    rate_limit: DEFAULT_RATE_LIMIT,
                },
            )
            .await
            .unwrap();

        std::fs::remove_dir_all(&dir).unwrap();

        assert!(registry.regenerate_token(&route.uuid).await.is_err());
        assert_eq!(registry.get_by_token(&route.token).await.unwrap(), route);

        assert!(registry.delete(&route.uuid).await.is_err());
        assert_eq!(registry.get(&route.uuid).await.unwrap(), route);

        assert!(registry
            .remove_user_link("owner@example.com", &route.uuid)
            .await
            .is_err());
        assert_eq!(registry.routes_for_user("owner@example.com").await.len(), 1);
    }

    #[tokio::test]
    async fn test_open_corrupt_snapshot_fails() {
        let path = temp_path("corrupt");
        std::fs::write(&path, b"not json").unwrap();

        assert!(Registry::open(path.clone()).await.is_err());

        let _ = std::fs::remove_file(path);
    }
}
