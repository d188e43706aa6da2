// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign in with Apple: ID token verification for the native iOS flow.
//!
//! The app sends the identity token it got from `ASAuthorizationController`;
//! we verify it against Apple's published JWKS. Apple only includes the
//! user's name in the client-side credential (and only on first
//! authorization), so name fragments travel next to the token.

use crate::config::Config;
use crate::models::{IdentitySource, ProfileAttributes, ThirdPartyIdentity};
use anyhow::Context;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

const APPLE_ISSUER: &str = "https://appleid.apple.com";
const DISCOVERY_URL: &str = "https://appleid.apple.com/.well-known/openid-configuration";
const DEFAULT_JWKS_URL: &str = "https://appleid.apple.com/auth/keys";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Name fragments the client received alongside the identity token.
#[derive(Debug, Clone, Default)]
pub struct AppleNameHint {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

/// OIDC verification error categories.
#[derive(Debug, Clone)]
pub enum OidcError {
    /// The token is missing/invalid or claims do not match expectations.
    Forbidden(String),
    /// A transient infrastructure failure occurred (JWKS unreachable).
    Transient(String),
}

#[derive(Clone)]
enum VerifierMode {
    Apple,
    StaticKey {
        kid: String,
        decoding_key: Arc<DecodingKey>,
    },
}

#[derive(Clone)]
struct DiscoveryCacheEntry {
    jwks_uri: String,
    expires_at: Instant,
}

#[derive(Clone)]
struct JwksCacheEntry {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Verifier for Apple-issued identity tokens.
pub struct AppleIdTokenVerifier {
    http_client: reqwest::Client,
    expected_audience: String,
    mode: VerifierMode,
    discovery_cache: RwLock<Option<DiscoveryCacheEntry>>,
    jwks_cache: RwLock<Option<JwksCacheEntry>>,
    refresh_lock: Mutex<()>,
}

impl AppleIdTokenVerifier {
    /// Create a production verifier that discovers and caches Apple JWKS keys.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let verifier = Self::with_mode(config, VerifierMode::Apple)?;

        tracing::info!(
            expected_audience = %verifier.expected_audience,
            "Initialized Apple ID token verifier"
        );

        Ok(verifier)
    }

    /// Create a verifier with a static RSA public key.
    ///
    /// This is intended for deterministic local/integration tests.
    pub fn new_with_static_key(
        config: &Config,
        kid: impl Into<String>,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static OIDC kid must not be empty");
        }

        Self::with_mode(
            config,
            VerifierMode::StaticKey {
                kid,
                decoding_key: Arc::new(decoding_key),
            },
        )
    }

    fn with_mode(config: &Config, mode: VerifierMode) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building OIDC HTTP client")?;

        Ok(Self {
            http_client,
            expected_audience: config.apple_client_id.clone(),
            mode,
            discovery_cache: RwLock::new(None),
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Verify an Apple identity token and turn it into a third-party identity.
    ///
    /// `raw_nonce` is the nonce the app generated before starting the
    /// authorization. Apple embeds its SHA-256 hex digest, so when given, the
    /// token's `nonce` claim must equal `hex(sha256(raw_nonce))`.
    pub async fn verify_identity_token(
        &self,
        token: &str,
        raw_nonce: Option<&str>,
        names: AppleNameHint,
    ) -> Result<ThirdPartyIdentity, OidcError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(OidcError::Forbidden("identity token is empty".to_string()));
        }

        let header = decode_header(token)
            .map_err(|e| OidcError::Forbidden(format!("invalid JWT header: {e}")))?;

        if header.alg != Algorithm::RS256 {
            return Err(OidcError::Forbidden(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| OidcError::Forbidden("missing JWT kid".to_string()))?;

        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&[APPLE_ISSUER]);
        validation.set_audience(&[self.expected_audience.as_str()]);
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<AppleIdTokenClaims>(token, decoding_key.as_ref(), &validation)
            .map_err(|e| OidcError::Forbidden(format!("JWT validation failed: {e}")))?
            .claims;

        if let Some(raw) = raw_nonce {
            if claims.nonce.as_deref() != Some(hashed_nonce(raw).as_str()) {
                return Err(OidcError::Forbidden("nonce mismatch".to_string()));
            }
        }

        let email = claims.email.filter(|e| !e.trim().is_empty());
        if email.is_some() && claims.email_verified.map(FlexibleBool::value) == Some(false) {
            return Err(OidcError::Forbidden(
                "email_verified claim is false".to_string(),
            ));
        }

        tracing::debug!(
            subject = %claims.sub,
            has_email = email.is_some(),
            private_relay = claims.is_private_email.map(FlexibleBool::value).unwrap_or(false),
            "Apple ID token verified"
        );

        Ok(ThirdPartyIdentity {
            external_user_id: claims.sub,
            email,
            profile: ProfileAttributes {
                full_name: None,
                given_name: names.given_name,
                family_name: names.family_name,
                avatar_url: None,
            },
            provider: IdentitySource::AppleNative,
        })
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, OidcError> {
        match &self.mode {
            VerifierMode::StaticKey {
                kid: static_kid,
                decoding_key,
            } => {
                if kid == static_kid {
                    return Ok(decoding_key.clone());
                }

                return Err(OidcError::Forbidden(format!(
                    "unknown JWT kid for static verifier: {kid}"
                )));
            }
            VerifierMode::Apple => {}
        }

        if let Some(key) = self.lookup_cached_key(kid).await {
            return Ok(key);
        }

        // Apple rotates keys; an unknown kid forces one uncached refetch.
        for force_refresh in [false, true] {
            self.refresh_jwks(force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(OidcError::Forbidden(format!(
            "JWT kid not found in JWKS after refresh: {kid}"
        )))
    }

    async fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let cache = self.jwks_cache.read().await;
        let now = Instant::now();
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.keys_by_kid.get(kid))
            .cloned()
    }

    async fn refresh_jwks(&self, force_refresh: bool) -> Result<(), OidcError> {
        let _guard = self.refresh_lock.lock().await;

        if !force_refresh {
            let cache = self.jwks_cache.read().await;
            if cache
                .as_ref()
                .is_some_and(|entry| entry.expires_at > Instant::now())
            {
                return Ok(());
            }
        }

        let jwks_uri = self.resolve_jwks_uri(force_refresh).await?;

        tracing::debug!(jwks_uri = %jwks_uri, "Refreshing Apple JWKS cache");

        let response = self
            .http_client
            .get(&jwks_uri)
            .send()
            .await
            .map_err(|e| OidcError::Transient(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(OidcError::Transient(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| OidcError::Transient(format!("invalid JWKS JSON: {e}")))?;

        let keys_by_kid = usable_rsa_keys(jwks);

        if keys_by_kid.is_empty() {
            return Err(OidcError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.jwks_cache.write().await = Some(JwksCacheEntry {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        });

        tracing::debug!(ttl_secs = ttl.as_secs(), "Apple JWKS cache refreshed");
        Ok(())
    }

    async fn resolve_jwks_uri(&self, force_refresh: bool) -> Result<String, OidcError> {
        let cached_jwks_uri = {
            let cache = self.discovery_cache.read().await;
            if let Some(entry) = cache.as_ref() {
                if !force_refresh && entry.expires_at > Instant::now() {
                    return Ok(entry.jwks_uri.clone());
                }
                Some(entry.jwks_uri.clone())
            } else {
                None
            }
        };

        let response = self.http_client.get(DISCOVERY_URL).send().await;
        match response {
            Ok(resp) if resp.status().is_success() => {
                let ttl = cache_ttl_from_headers(resp.headers(), DEFAULT_CACHE_TTL);
                let discovery: OpenIdConfig = resp
                    .json()
                    .await
                    .map_err(|e| OidcError::Transient(format!("invalid discovery JSON: {e}")))?;

                *self.discovery_cache.write().await = Some(DiscoveryCacheEntry {
                    jwks_uri: discovery.jwks_uri.clone(),
                    expires_at: Instant::now() + ttl,
                });

                Ok(discovery.jwks_uri)
            }
            Ok(resp) => {
                tracing::warn!(
                    status = %resp.status(),
                    "OIDC discovery returned non-success status; using fallback JWKS URI"
                );
                Ok(cached_jwks_uri.unwrap_or_else(|| DEFAULT_JWKS_URL.to_string()))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "OIDC discovery request failed; using fallback JWKS URI"
                );
                Ok(cached_jwks_uri.unwrap_or_else(|| DEFAULT_JWKS_URL.to_string()))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenIdConfig {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

/// Apple sends some booleans as JSON strings ("true") depending on the flow.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum FlexibleBool {
    Bool(bool),
    Text(StringBool),
}

#[derive(Debug, Clone, Copy, Deserialize)]
enum StringBool {
    #[serde(rename = "true")]
    True,
    #[serde(rename = "false")]
    False,
}

impl FlexibleBool {
    fn value(self) -> bool {
        match self {
            FlexibleBool::Bool(b) => b,
            FlexibleBool::Text(StringBool::True) => true,
            FlexibleBool::Text(StringBool::False) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AppleIdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<FlexibleBool>,
    #[serde(default)]
    is_private_email: Option<FlexibleBool>,
    #[serde(default)]
    nonce: Option<String>,
}

/// Digest Apple places in the `nonce` claim for a client-generated raw nonce.
pub fn hashed_nonce(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn usable_rsa_keys(jwks: Jwks) -> HashMap<String, Arc<DecodingKey>> {
    let mut keys_by_kid = HashMap::new();

    for jwk in jwks.keys {
        if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
            continue;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            continue;
        }
        if jwk.use_.as_deref().is_some_and(|use_| use_ != "sig") {
            continue;
        }

        match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => {
                keys_by_kid.insert(jwk.kid, Arc::new(key));
            }
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
            }
        }
    }

    keys_by_kid
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|raw| raw.trim_matches('"').parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_cache_control_max_age_valid() {
        assert_eq!(
            parse_cache_control_max_age("public, max-age=3600"),
            Some(3600)
        );
        assert_eq!(parse_cache_control_max_age("max-age=\"120\""), Some(120));
    }

    #[test]
    fn parse_cache_control_max_age_invalid() {
        assert_eq!(parse_cache_control_max_age("no-cache, immutable"), None);
        assert_eq!(parse_cache_control_max_age("max-age=abc"), None);
        assert_eq!(parse_cache_control_max_age(""), None);
    }

    #[test]
    fn flexible_bool_accepts_strings() {
        let claims: AppleIdTokenClaims = serde_json::from_value(json!({
            "sub": "001234.abcd",
            "email": "x@privaterelay.appleid.com",
            "email_verified": "true",
            "is_private_email": true
        }))
        .unwrap();

        assert_eq!(claims.email_verified.map(FlexibleBool::value), Some(true));
        assert_eq!(claims.is_private_email.map(FlexibleBool::value), Some(true));
    }

    #[test]
    fn hashed_nonce_is_sha256_hex() {
        assert_eq!(
            hashed_nonce("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    fn static_verifier(config: &Config) -> AppleIdTokenVerifier {
        let public_pem = include_bytes!("../../tests/fixtures/apple_test_key.pub.pem");
        AppleIdTokenVerifier::new_with_static_key(
            config,
            "test-kid",
            DecodingKey::from_rsa_pem(public_pem).unwrap(),
        )
        .unwrap()
    }

    fn signed_token(config: &Config, nonce: &str) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let private_pem = include_bytes!("../../tests/fixtures/apple_test_key.pem");
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("test-kid".to_string());

        encode(
            &header,
            &json!({
                "iss": APPLE_ISSUER,
                "aud": config.apple_client_id,
                "sub": "apple-sub",
                "iat": now,
                "exp": now + 600,
                "nonce": nonce,
            }),
            &EncodingKey::from_rsa_pem(private_pem).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn nonce_claim_checked_against_hashed_raw_nonce() {
        let config = Config::test_default();
        let verifier = static_verifier(&config);
        let token = signed_token(&config, &hashed_nonce("raw-nonce-123"));

        let identity = verifier
            .verify_identity_token(&token, Some("raw-nonce-123"), AppleNameHint::default())
            .await
            .unwrap();
        assert_eq!(identity.external_user_id, "apple-sub");
        assert_eq!(identity.provider, IdentitySource::AppleNative);

        // The digest itself is not the raw nonce.
        let digest = hashed_nonce("raw-nonce-123");
        assert!(matches!(
            verifier
                .verify_identity_token(&token, Some(&digest), AppleNameHint::default())
                .await,
            Err(OidcError::Forbidden(_))
        ));

        assert!(matches!(
            verifier
                .verify_identity_token(&token, Some("other"), AppleNameHint::default())
                .await,
            Err(OidcError::Forbidden(_))
        ));
    }

    #[test]
    fn jwks_filters_unusable_keys() {
        let jwks: Jwks = serde_json::from_value(json!({
            "keys": [
                { "kid": "ec", "kty": "EC", "n": "", "e": "" },
                {
                    "kid": "enc", "kty": "RSA", "use": "enc", "alg": "RS256",
                    "n": "AQAB", "e": "AQAB"
                },
                { "kid": "", "kty": "RSA", "n": "AQAB", "e": "AQAB" },
                {
                    "kid": "ok", "kty": "RSA", "use": "sig", "alg": "RS256",
                    "n": "AQAB", "e": "AQAB"
                }
            ]
        }))
        .unwrap();

        let keys = usable_rsa_keys(jwks);
        assert_eq!(keys.len(), 1);
        assert!(keys.contains_key("ok"));
    }

    #[tokio::test]
    async fn garbage_token_forbidden() {
        let verifier = AppleIdTokenVerifier::new_with_static_key(
            &Config::test_default(),
            "test-kid",
            DecodingKey::from_secret(b"unused"),
        )
        .unwrap();

        for token in ["", "not-a-jwt", "a.b.c"] {
            assert!(matches!(
                verifier
                    .verify_identity_token(token, None, AppleNameHint::default())
                    .await,
                Err(OidcError::Forbidden(_))
            ));
        }
    }
}
