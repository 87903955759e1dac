//! Firewall rule set document and address matching.

use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Allows traffic to `cidr` on ports `from_port..=to_port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub from_port: u16,
    pub to_port: u16,
    /// Host bits may be set; membership uses the masked network.
    pub cidr: IpNet,
}

impl Rule {
    pub fn does_pass_rule(&self, ip: IpAddr, port: u16) -> bool {
        let has_correct_port = self.from_port <= port && port <= self.to_port;
        has_correct_port && self.cidr.trunc().contains(&ip)
    }
}

/// The full firewall document: allow rules plus the admin users who may
/// change them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallConfig {
    #[serde(rename = "firewallRules", default)]
    pub firewall_rules: Vec<Rule>,
    #[serde(rename = "adminUsers", default)]
    pub admin_users: Vec<String>,
}

impl FirewallConfig {
    /// Parse and validate a document received from a client.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ApiError> {
        let config: FirewallConfig =
            serde_json::from_value(value).map_err(|e| ApiError::InvalidConfig(e.to_string()))?;

        if let Some(rule) = config.firewall_rules.iter().find(|r| r.from_port > r.to_port) {
            return Err(ApiError::InvalidConfig(format!(
                "from_port {} is greater than to_port {} for {}",
                rule.from_port, rule.to_port, rule.cidr
            )));
        }

        Ok(config)
    }

    pub fn is_admin(&self, user: &str) -> bool {
        self.admin_users.iter().any(|admin| admin == user)
    }

    /// Whether a single address passes at least one rule.
    pub fn allows(&self, ip: IpAddr, port: u16) -> bool {
        self.firewall_rules
            .iter()
            .any(|rule| rule.does_pass_rule(ip, port))
    }

    /// Whether every address passes at least one rule.
    ///
    /// An empty address set never passes.
    pub fn allows_all(&self, addresses: &[IpAddr], port: u16) -> bool {
        !addresses.is_empty() && addresses.iter().all(|ip| self.allows(*ip, port))
    }
}
