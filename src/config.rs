// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Loaded once at startup and handed to every service by reference; nothing
//! below `main` reads the environment directly.

use crate::db::collections;
use std::env;
use std::time::Duration;

/// Minimum length of the session signing key.
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Server port
    pub port: u16,
    /// Frontend origin allowed by CORS
    pub frontend_url: String,
    /// Base URL of the hosted Supabase project (no trailing slash)
    pub supabase_url: String,
    /// Table holding canonical user rows
    pub users_table: String,
    /// Apple Services ID / bundle ID expected as `aud` in Apple ID tokens
    pub apple_client_id: String,
    /// Domain used to synthesize an email when a provider omits it
    pub placeholder_email_domain: String,
    /// Upper bound on a hosted-auth introspection call
    pub introspection_timeout: Duration,
    /// Session lifetime for accounts still pending profile completion
    pub session_ttl_pending: Duration,
    /// Session lifetime for fully provisioned accounts
    pub session_ttl: Duration,
    /// Optional `kid` placed in session token headers
    pub jwt_key_id: Option<String>,

    // --- Secrets ---
    /// Public anon key, sent as `apikey` on GoTrue calls
    pub supabase_anon_key: String,
    /// Service-role key used for table reads and writes
    pub supabase_service_key: String,
    /// HS256 signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:8081".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            users_table: collections::USERS.to_string(),
            apple_client_id: "com.example.learnpoints".to_string(),
            placeholder_email_domain: "privaterelay.invalid".to_string(),
            introspection_timeout: Duration::from_secs(1),
            session_ttl_pending: Duration::from_secs(60 * 60),
            session_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            jwt_key_id: None,
            supabase_anon_key: "test_anon_key".to_string(),
            supabase_service_key: "test_service_key".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honoured for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let jwt_signing_key = required("JWT_SIGNING_KEY")?.into_bytes();
        if jwt_signing_key.len() < MIN_SIGNING_KEY_LEN {
            return Err(ConfigError::Invalid(
                "JWT_SIGNING_KEY",
                format!("must be at least {MIN_SIGNING_KEY_LEN} bytes"),
            ));
        }

        Ok(Self {
            port: parse_or("PORT", 8080)?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
            supabase_url: required("SUPABASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            users_table: env::var("USERS_TABLE").unwrap_or_else(|_| collections::USERS.to_string()),
            apple_client_id: required("APPLE_CLIENT_ID")?,
            placeholder_email_domain: env::var("PLACEHOLDER_EMAIL_DOMAIN")
                .map(|v| v.trim().to_ascii_lowercase())
                .unwrap_or_else(|_| "privaterelay.invalid".to_string()),
            introspection_timeout: Duration::from_secs(parse_or(
                "INTROSPECTION_TIMEOUT_SECS",
                5,
            )?),
            session_ttl_pending: Duration::from_secs(parse_or(
                "SESSION_TTL_PENDING_SECS",
                60 * 60,
            )?),
            session_ttl: Duration::from_secs(parse_or("SESSION_TTL_SECS", 7 * 24 * 60 * 60)?),
            jwt_key_id: env::var("JWT_KEY_ID").ok().filter(|v| !v.trim().is_empty()),

            supabase_anon_key: required("SUPABASE_ANON_KEY")?,
            supabase_service_key: required("SUPABASE_SERVICE_KEY")?,
            jwt_signing_key,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, format!("could not parse {raw:?}"))),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
