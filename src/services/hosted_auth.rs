// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Hosted identity provider (Supabase GoTrue) token introspection.
//!
//! A third-party access token is handed to `GET /auth/v1/user`; a 2xx answer
//! means the provider vouches for the token and returns the identity behind it.

use crate::config::Config;
use crate::models::{IdentitySource, ProfileAttributes, ThirdPartyIdentity};
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Introspection failure categories.
///
/// Neither is fatal to the caller: both mean "not verified by this provider".
#[derive(Debug, Clone)]
pub enum IntrospectionError {
    /// The provider answered and refused the token, or its identity is unusable.
    Rejected(String),
    /// The provider could not be reached or answered garbage.
    Transient(String),
}

impl std::fmt::Display for IntrospectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntrospectionError::Rejected(reason) => write!(f, "rejected: {reason}"),
            IntrospectionError::Transient(reason) => write!(f, "transient: {reason}"),
        }
    }
}

#[derive(Clone)]
enum IntrospectionMode {
    Remote {
        http_client: reqwest::Client,
        user_url: String,
        anon_key: String,
    },
    Static {
        identities: Arc<HashMap<String, ThirdPartyIdentity>>,
    },
}

/// Client for the hosted provider's introspection endpoint.
#[derive(Clone)]
pub struct HostedAuthClient {
    mode: IntrospectionMode,
}

impl HostedAuthClient {
    /// Create a client that calls the hosted provider, bounded by the configured timeout.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.introspection_timeout)
            .build()
            .context("failed building introspection HTTP client")?;

        let user_url = format!("{}/auth/v1/user", config.supabase_url.trim_end_matches('/'));

        tracing::info!(
            user_url = %user_url,
            timeout_ms = config.introspection_timeout.as_millis() as u64,
            "Initialized hosted auth introspection client"
        );

        Ok(Self {
            mode: IntrospectionMode::Remote {
                http_client,
                user_url,
                anon_key: config.supabase_anon_key.clone(),
            },
        })
    }

    /// Create a client that knows a fixed set of tokens.
    ///
    /// This is intended for deterministic local/integration tests.
    pub fn new_static(identities: HashMap<String, ThirdPartyIdentity>) -> Self {
        Self {
            mode: IntrospectionMode::Static {
                identities: Arc::new(identities),
            },
        }
    }

    /// Ask the provider who the token belongs to.
    pub async fn introspect(&self, token: &str) -> Result<ThirdPartyIdentity, IntrospectionError> {
        match &self.mode {
            IntrospectionMode::Static { identities } => identities
                .get(token)
                .cloned()
                .ok_or_else(|| IntrospectionError::Rejected("unknown static token".to_string())),
            IntrospectionMode::Remote {
                http_client,
                user_url,
                anon_key,
            } => {
                let response = http_client
                    .get(user_url)
                    .header("apikey", anon_key)
                    .bearer_auth(token)
                    .send()
                    .await
                    .map_err(|e| IntrospectionError::Transient(format!("request failed: {e}")))?;

                let status = response.status();
                if status.is_client_error() {
                    return Err(IntrospectionError::Rejected(format!(
                        "provider returned status {status}"
                    )));
                }
                if !status.is_success() {
                    return Err(IntrospectionError::Transient(format!(
                        "provider returned status {status}"
                    )));
                }

                let user: HostedUser = response
                    .json()
                    .await
                    .map_err(|e| IntrospectionError::Transient(format!("invalid user JSON: {e}")))?;

                identity_from_hosted_user(user)
            }
        }
    }
}

/// Subset of the GoTrue user object we rely on.
#[derive(Debug, Deserialize)]
struct HostedUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<String>,
    #[serde(default)]
    confirmed_at: Option<String>,
    #[serde(default)]
    app_metadata: AppMetadata,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct AppMetadata {
    #[serde(default)]
    provider: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

fn identity_from_hosted_user(user: HostedUser) -> Result<ThirdPartyIdentity, IntrospectionError> {
    if user.id.trim().is_empty() {
        return Err(IntrospectionError::Rejected("empty subject id".to_string()));
    }

    let provider = match user.app_metadata.provider.as_deref() {
        Some("google") => IdentitySource::Google,
        Some("apple") => IdentitySource::Apple,
        other => {
            return Err(IntrospectionError::Rejected(format!(
                "unsupported provider: {}",
                other.unwrap_or("<missing>")
            )));
        }
    };

    let email = user.email.filter(|e| !e.trim().is_empty());
    let confirmed = user.email_confirmed_at.is_some() || user.confirmed_at.is_some();
    if email.is_some() && !confirmed {
        return Err(IntrospectionError::Rejected(
            "email is not confirmed".to_string(),
        ));
    }

    let metadata = user.user_metadata;
    Ok(ThirdPartyIdentity {
        external_user_id: user.id,
        email,
        profile: ProfileAttributes {
            full_name: metadata.full_name.or(metadata.name),
            given_name: metadata.given_name,
            family_name: metadata.family_name,
            avatar_url: metadata.avatar_url.or(metadata.picture),
        },
        provider,
    })
}
