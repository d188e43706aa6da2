// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-up, sign-in and session issuance routes.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::user::normalize_email;
use crate::models::{IdentitySource, NewUser, User};
use crate::routes::api::UserResponse;
use crate::routes::validate_body;
use crate::services::apple::{AppleNameHint, OidcError};
use crate::services::password::{
    hash_password_blocking, verify_dummy_blocking, verify_password_blocking,
};
use crate::services::SessionLifetime;
use crate::AppState;

/// Public routes: no bearer token needed.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/apple", post(apple_sign_in))
}

/// Routes behind the auth gate.
pub fn session_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/token", post(exchange_token))
}

/// Successful authentication: a session token plus the user it belongs to.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    /// Seconds until `token` expires
    pub expires_in: u64,
    pub user: UserResponse,
}

/// Issue a session for `user` and wrap it in the response body.
pub(crate) fn session_response(
    state: &AppState,
    user: User,
    lifetime: SessionLifetime,
) -> Result<AuthResponse> {
    let token = state
        .sessions
        .issue(&user, lifetime)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    Ok(AuthResponse {
        success: true,
        token,
        expires_in: state.sessions.ttl(lifetime).as_secs(),
        user: UserResponse::from(user),
    })
}

// ─── Password ────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 128))]
    password: String,
    #[validate(length(min = 1, max = 100))]
    name: String,
}

/// Create an email + password account.
///
/// The profile is incomplete at this point, so the session is short-lived.
async fn signup(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let Json(body) = payload?;
    validate_body(&body)?;

    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be blank".to_string()));
    }

    let email = normalize_email(&body.email);
    if state.db.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    let mut new_user = NewUser::new(email, name, IdentitySource::Password);
    new_user.password_hash = Some(hash_password_blocking(body.password).await?);

    // The unique constraint still decides a concurrent signup race (409).
    let user = state.db.insert_user(&new_user).await?;

    tracing::info!(user_id = %user.id, "Password account created");

    let response = session_response(&state, user, SessionLifetime::PendingProfile)?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 320))]
    email: String,
    #[validate(length(min = 1, max = 128))]
    password: String,
}

/// Sign in with email + password.
async fn login(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>> {
    let Json(body) = payload?;
    validate_body(&body)?;

    let email = normalize_email(&body.email);

    // Unknown emails and accounts created through Google/Apple have no
    // password; they still pay for one Argon2 verification.
    let found = state.db.find_user_by_email(&email).await?;
    let Some((user, hash)) =
        found.and_then(|user| user.password_hash.clone().map(|hash| (user, hash)))
    else {
        tracing::debug!("Password login for unknown account or account without password");
        verify_dummy_blocking(body.password).await?;
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password_blocking(hash, body.password).await? {
        tracing::info!(user_id = %user.id, "Password login failed");
        return Err(AppError::InvalidCredentials);
    }

    if !user.is_active {
        return Err(AppError::Forbidden("Account is deactivated".to_string()));
    }

    let lifetime = SessionLifetime::for_user(&user);
    tracing::info!(user_id = %user.id, ?lifetime, "Password login succeeded");

    Ok(Json(session_response(&state, user, lifetime)?))
}

// ─── Third-party ─────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct AppleSignInRequest {
    #[validate(length(min = 1))]
    identity_token: String,
    /// Raw nonce the app generated; the identity token carries its SHA-256 hex.
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100))]
    given_name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100))]
    family_name: Option<String>,
}

/// Native Sign in with Apple: verify the identity token, reconcile, issue a session.
async fn apple_sign_in(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<AppleSignInRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>> {
    let Json(body) = payload?;
    validate_body(&body)?;

    let names = AppleNameHint {
        given_name: body.given_name,
        family_name: body.family_name,
    };

    let identity = state
        .apple_verifier
        .verify_identity_token(&body.identity_token, body.nonce.as_deref(), names)
        .await
        .map_err(|err| match err {
            OidcError::Forbidden(reason) => {
                tracing::warn!(reason = %reason, "Rejected Apple identity token");
                AppError::InvalidToken
            }
            OidcError::Transient(reason) => AppError::IdentityProvider(reason),
        })?;

    let user = state.reconciler.reconcile(&identity).await?;

    tracing::info!(user_id = %user.id, "Apple sign-in succeeded");

    Ok(Json(session_response(&state, user, SessionLifetime::Full)?))
}

/// Swap the presented bearer token (hosted or self-issued) for a fresh session.
async fn exchange_token(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<AuthResponse>> {
    let user = state
        .db
        .get_user(&auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", auth.user_id)))?;

    if !user.is_active {
        return Err(AppError::Forbidden("Account is deactivated".to_string()));
    }

    let lifetime = SessionLifetime::for_user(&user);
    tracing::debug!(
        user_id = %user.id,
        via_provider = auth.identity.is_some(),
        "Issuing session from bearer token"
    );

    Ok(Json(session_response(&state, user, lifetime)?))
}
