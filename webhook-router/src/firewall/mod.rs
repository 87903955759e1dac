//! Firewall validator: decides whether a destination URL may be relayed to.
//!
//! The active rule set is an immutable snapshot behind an `ArcSwap`.
//! Validators load the snapshot once per check; `set_config` swaps in a new
//! snapshot wholesale, so a check never sees a half-applied rule set.

pub mod rules;
pub mod source;

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::{Host, Url};

use crate::error::ApiError;

pub use rules::{FirewallConfig, Rule};
pub use source::ConfigSource;

/// Port checked when a URL names none, whatever its scheme.
pub const DEFAULT_PORT: u16 = 80;

/// Shared firewall state.
pub struct FirewallValidator {
    current: ArcSwap<FirewallConfig>,
    source: ConfigSource,
    /// Serializes writers so the persisted and live documents agree.
    write_lock: Mutex<()>,
}

impl FirewallValidator {
    /// Load the rule set from `source`.
    pub async fn load(source: ConfigSource) -> Result<Self> {
        let raw = source.read().await?;
        let config: FirewallConfig =
            serde_json::from_str(&raw).context("Failed to parse firewall config")?;

        info!(
            rules = config.firewall_rules.len(),
            admins = config.admin_users.len(),
            "firewall_config_loaded"
        );

        Ok(Self {
            current: ArcSwap::from_pointee(config),
            source,
            write_lock: Mutex::new(()),
        })
    }

    /// The rule set in effect right now.
    pub fn snapshot(&self) -> Arc<FirewallConfig> {
        self.current.load_full()
    }

    /// Persist and activate a new rule set.
    pub async fn set_config(&self, config: FirewallConfig) -> Result<(), ApiError> {
        let _guard = self.write_lock.lock().await;

        let body = serde_json::to_string(&config).context("Failed to serialize firewall config")?;
        self.source.write(body).await?;

        info!(
            rules = config.firewall_rules.len(),
            admins = config.admin_users.len(),
            "firewall_config_replaced"
        );

        self.current.store(Arc::new(config));

        Ok(())
    }

    pub fn is_admin(&self, user: &str) -> bool {
        self.current.load().is_admin(user)
    }

    /// Whether every address `url` resolves to passes some rule.
    ///
    /// Unparsable URLs and DNS failures count as invalid.
    pub async fn is_url_valid(&self, url: &str) -> bool {
        let config = self.snapshot();

        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                warn!(url = %url, error = %e, "firewall_url_unparsable");
                return false;
            }
        };

        let port = effective_port(url, &parsed);

        let addresses = match resolve_host(&parsed, port).await {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!(url = %url, error = %e, "firewall_resolution_failed");
                return false;
            }
        };

        let valid = config.allows_all(&addresses, port);

        info!(
            url = %url,
            port = port,
            addresses = ?addresses,
            valid = valid,
            "firewall_url_checked"
        );

        valid
    }
}

/// The port a URL names, else [`DEFAULT_PORT`].
///
/// `Url` drops a port equal to its scheme's default, so `https://host:443`
/// is recovered from the authority as written.
pub fn effective_port(raw: &str, parsed: &Url) -> u16 {
    if let Some(port) = parsed.port() {
        return port;
    }

    let written_default = parsed.port_or_known_default().filter(|default| {
        let authority = raw
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(raw)
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default();
        authority.ends_with(&format!(":{}", default))
    });

    written_default.unwrap_or(DEFAULT_PORT)
}

/// Resolve the URL host to the full set of addresses it maps to.
pub async fn resolve_host(url: &Url, port: u16) -> Result<Vec<IpAddr>> {
    match url.host() {
        Some(Host::Ipv4(ip)) => Ok(vec![IpAddr::V4(ip)]),
        Some(Host::Ipv6(ip)) => Ok(vec![IpAddr::V6(ip)]),
        Some(Host::Domain(domain)) => {
            let addresses: BTreeSet<IpAddr> = tokio::net::lookup_host((domain, port))
                .await
                .with_context(|| format!("DNS resolution failed for {}", domain))?
                .map(|addr| addr.ip())
                .collect();

            if addresses.is_empty() {
                anyhow::bail!("DNS resolution returned no addresses for {}", domain);
            }

            Ok(addresses.into_iter().collect())
        }
        None => anyhow::bail!("URL has no host"),
    }
}
