//! Caller identity for the config and firewall servers.
//!
//! Identity is resolved to an email-like user string. In debug mode the
//! `user` header is trusted as-is. Otherwise the caller sends
//! `Authorization: Bearer <provider>=<access token>` and the token is
//! verified against the provider's userinfo endpoint.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::warn;

use crate::error::ApiError;
use crate::Config;

/// Header carrying the identity in debug mode.
pub const DEBUG_USER_HEADER: &str = "user";

/// Identity resolver.
#[derive(Debug, Clone)]
pub enum Authenticator {
    /// Trust the `user` header, falling back to a fixed identity
    Debug { default_user: String },
    /// Verify bearer tokens with an OAuth provider
    OAuth(OAuthVerifier),
}

/// Userinfo endpoints and the policy applied to their answers.
#[derive(Debug, Clone)]
pub struct OAuthVerifier {
    client: Client,
    google_userinfo_url: String,
    sanger_userinfo_url: String,
    allowed_domain: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: String,
    #[serde(default)]
    hd: Option<String>,
}

impl Authenticator {
    pub fn from_config(config: &Config, client: Client) -> Self {
        if config.debug {
            Authenticator::Debug {
                default_user: config.debug_user.clone(),
            }
        } else {
            Authenticator::OAuth(OAuthVerifier {
                client,
                google_userinfo_url: config.google_userinfo_url.clone(),
                sanger_userinfo_url: config.sanger_userinfo_url.clone(),
                allowed_domain: config.allowed_domain.clone(),
            })
        }
    }

    /// Resolve the caller's identity from request headers.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<String, ApiError> {
        match self {
            Authenticator::Debug { default_user } => Ok(headers
                .get(DEBUG_USER_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .unwrap_or_else(|| default_user.clone())),
            Authenticator::OAuth(verifier) => verifier.verify(headers).await,
        }
    }
}

impl OAuthVerifier {
    async fn verify(&self, headers: &HeaderMap) -> Result<String, ApiError> {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::InvalidCredentials("No token provided".into()))?;

        let (provider, token) = bearer.split_once('=').ok_or_else(|| {
            ApiError::InvalidCredentials(
                "Token did not contain an '=' with the token provider".into(),
            )
        })?;

        let endpoint = match provider {
            "google" => &self.google_userinfo_url,
            "sanger" => &self.sanger_userinfo_url,
            other => {
                return Err(ApiError::InvalidCredentials(format!(
                    "Unknown token provider {}",
                    other
                )))
            }
        };

        let response = self
            .client
            .get(endpoint)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!(e).context("Userinfo request failed"))?;

        if response.status() != StatusCode::OK {
            warn!(
                provider = provider,
                status_code = response.status().as_u16(),
                "auth_token_rejected"
            );
            return Err(ApiError::InvalidCredentials(format!(
                "{} rejected the token",
                provider
            )));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidCredentials(format!("Malformed userinfo: {}", e)))?;

        if provider == "google" {
            if let Some(domain) = &self.allowed_domain {
                if info.hd.as_deref() != Some(domain.as_str()) {
                    warn!(
                        email = %info.email,
                        hosted_domain = ?info.hd,
                        expected_domain = %domain,
                        "auth_wrong_hosted_domain"
                    );
                    return Err(ApiError::InvalidCredentials(format!(
                        "Google account is not in {}",
                        domain
                    )));
                }
            }
        }

        Ok(info.email)
    }
}
