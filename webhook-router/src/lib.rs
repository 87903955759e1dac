//! Webhook router - token-addressed webhook relay with its config services.
//!
//! This library provides shared modules for the three binaries:
//! - `whr-router`: relays `POST /{token}` to the route's destination
//! - `whr-config`: route and link CRUD, delivery statistics
//! - `whr-firewall`: destination allow-rules and URL validation
//!
//! ## Architecture
//!
//! ```text
//! Sender → Router ──token lookup──→ Config server → Registry
//!            │
//!            └──relay──→ Destination        Firewall ← rule set
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod firewall;
pub mod registry;
pub mod relay;
pub mod stats;
pub mod telemetry;
pub mod token;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::ApiError;
pub use firewall::FirewallValidator;
pub use registry::Registry;
pub use relay::{Relay, RelayError};
