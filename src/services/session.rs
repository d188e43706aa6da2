// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Self-issued session tokens (HS256 JWT).
//!
//! Tokens are stateless: validity is signature + `exp` only, there is no
//! server-side revocation list.

use crate::config::Config;
use crate::models::{IdentitySource, User};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Claim names owned by the issuer, plus the registered JWT claims `verify`
/// would validate; extra claims may not set them.
const RESERVED_CLAIMS: [&str; 10] = [
    "userId",
    "email",
    "identitySource",
    "iat",
    "exp",
    "aud",
    "iss",
    "sub",
    "nbf",
    "jti",
];

/// Session token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    /// Local user id
    pub user_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_source: Option<IdentitySource>,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Which configured lifetime a freshly issued token gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifetime {
    /// Account exists but the profile still needs completing.
    PendingProfile,
    /// Fully provisioned account or third-party sign-in.
    Full,
}

impl SessionLifetime {
    /// Password accounts stay on the short lifetime until their profile is filled in.
    pub fn for_user(user: &User) -> Self {
        if user.identity_source == IdentitySource::Password && !user.profile_complete() {
            SessionLifetime::PendingProfile
        } else {
            SessionLifetime::Full
        }
    }
}

/// Mints and verifies session tokens with the server's shared secret.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    key_id: Option<String>,
    ttl_pending: Duration,
    ttl_full: Duration,
}

impl SessionIssuer {
    pub fn new(config: &Config) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(&config.jwt_signing_key),
            decoding_key: DecodingKey::from_secret(&config.jwt_signing_key),
            key_id: config.jwt_key_id.clone(),
            ttl_pending: config.session_ttl_pending,
            ttl_full: config.session_ttl,
        }
    }

    pub fn ttl(&self, lifetime: SessionLifetime) -> Duration {
        match lifetime {
            SessionLifetime::PendingProfile => self.ttl_pending,
            SessionLifetime::Full => self.ttl_full,
        }
    }

    /// Create a session token for a user.
    pub fn issue(&self, user: &User, lifetime: SessionLifetime) -> anyhow::Result<String> {
        self.issue_with_claims(user, lifetime, serde_json::Map::new())
    }

    /// Create a session token carrying additional claims.
    pub fn issue_with_claims(
        &self,
        user: &User,
        lifetime: SessionLifetime,
        mut extra: serde_json::Map<String, serde_json::Value>,
    ) -> anyhow::Result<String> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        extra.retain(|key, _| !RESERVED_CLAIMS.contains(&key.as_str()));

        let claims = SessionClaims {
            user_id: user.id.clone(),
            email: user.email.clone(),
            identity_source: Some(user.identity_source),
            iat: now,
            exp: now + self.ttl(lifetime).as_secs(),
            extra,
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = self.key_id.clone();

        Ok(encode(&header, &claims, &self.encoding_key)?)
    }

    /// Check signature and expiry of a session token.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<SessionClaims>(token, &self.decoding_key, &validation).map(|data| data.claims)
    }
}
