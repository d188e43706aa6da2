// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, Response};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use learnpoints_api::config::Config;
use learnpoints_api::db::SupabaseDb;
use learnpoints_api::models::{IdentitySource, ProfileAttributes, ThirdPartyIdentity};
use learnpoints_api::routes::create_router;
use learnpoints_api::services::apple::hashed_nonce;
use learnpoints_api::services::{AppleIdTokenVerifier, HostedAuthClient};
use learnpoints_api::AppState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Key id the static Apple verifier trusts.
#[allow(dead_code)]
pub const APPLE_TEST_KID: &str = "test-kid";

/// Hosted token that introspects to a Google user with email a@b.com.
#[allow(dead_code)]
pub const GOOGLE_TOKEN: &str = "hosted-google-token";

/// Same Google user, now reporting a longer name.
#[allow(dead_code)]
pub const GOOGLE_TOKEN_RENAMED: &str = "hosted-google-token-renamed";

/// Hosted Apple token whose identity carries no email.
#[allow(dead_code)]
pub const APPLE_NO_EMAIL_TOKEN: &str = "hosted-apple-no-email";

const APPLE_PRIVATE_KEY: &[u8] = include_bytes!("../fixtures/apple_test_key.pem");
const APPLE_PUBLIC_KEY: &[u8] = include_bytes!("../fixtures/apple_test_key.pub.pem");

#[allow(dead_code)]
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn google_identity(name: &str) -> ThirdPartyIdentity {
    ThirdPartyIdentity {
        external_user_id: "google-sub-1".to_string(),
        email: Some("a@b.com".to_string()),
        profile: ProfileAttributes {
            full_name: Some(name.to_string()),
            ..Default::default()
        },
        provider: IdentitySource::Google,
    }
}

/// Identities the static hosted-auth client recognizes.
#[allow(dead_code)]
pub fn hosted_identities() -> HashMap<String, ThirdPartyIdentity> {
    HashMap::from([
        (GOOGLE_TOKEN.to_string(), google_identity("Ann")),
        (GOOGLE_TOKEN_RENAMED.to_string(), google_identity("Ann Marie")),
        (
            APPLE_NO_EMAIL_TOKEN.to_string(),
            ThirdPartyIdentity {
                external_user_id: "sub123".to_string(),
                email: None,
                profile: ProfileAttributes::default(),
                provider: IdentitySource::Apple,
            },
        ),
    ])
}

/// Build state around the given store with static verifiers.
#[allow(dead_code)]
pub fn create_test_state(db: SupabaseDb) -> Arc<AppState> {
    let config = Config::test_default();
    let hosted_auth = HostedAuthClient::new_static(hosted_identities());
    let apple_verifier = Arc::new(
        AppleIdTokenVerifier::new_with_static_key(
            &config,
            APPLE_TEST_KID,
            DecodingKey::from_rsa_pem(APPLE_PUBLIC_KEY).expect("valid test public key"),
        )
        .expect("static Apple verifier"),
    );

    Arc::new(AppState::new(config, db, hosted_auth, apple_verifier))
}

/// Create a test app backed by the in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let state = create_test_state(SupabaseDb::new_in_memory());
    (create_router(state.clone()), state)
}

/// HS256 token with arbitrary claims, signed with the test key.
#[allow(dead_code)]
pub fn create_test_jwt(claims: &Value) -> String {
    let config = Config::test_default();
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(&config.jwt_signing_key),
    )
    .unwrap()
}

/// Apple identity token signed with the fixture key.
///
/// `nonce` is the raw client nonce; the token carries its SHA-256 digest
/// like a real Apple token does.
#[allow(dead_code)]
pub fn create_apple_token(sub: &str, email: Option<&str>, nonce: Option<&str>) -> String {
    let now = now_secs();
    let mut claims = json!({
        "iss": "https://appleid.apple.com",
        "aud": Config::test_default().apple_client_id,
        "sub": sub,
        "iat": now,
        "exp": now + 600,
    });
    if let Some(email) = email {
        claims["email"] = json!(email);
        claims["email_verified"] = json!("true");
    }
    if let Some(nonce) = nonce {
        claims["nonce"] = json!(hashed_nonce(nonce));
    }

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(APPLE_TEST_KID.to_string());

    encode(
        &header,
        &claims,
        &EncodingKey::from_rsa_pem(APPLE_PRIVATE_KEY).unwrap(),
    )
    .unwrap()
}

/// JSON request with an optional bearer token.
#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Bodyless request with a raw `Authorization` header value.
#[allow(dead_code)]
pub fn authorized_get(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
