// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bearer authentication gate for protected routes.

use crate::error::AppError;
use crate::models::ThirdPartyIdentity;
use crate::services::TokenOutcome;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Authenticated user resolved by the gate.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Local user id
    pub user_id: String,
    pub email: String,
    /// Provider identity, when the request carried a third-party token.
    pub identity: Option<ThirdPartyIdentity>,
}

/// Middleware that requires a valid bearer token.
///
/// On success the [`AuthUser`] is placed in the request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_user = authenticate(&state, request.headers().get(header::AUTHORIZATION)).await?;
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Resolve an `Authorization` header to a local user.
pub async fn authenticate(
    state: &AppState,
    auth_header: Option<&HeaderValue>,
) -> Result<AuthUser, AppError> {
    let token = extract_bearer_token(auth_header)?;

    match state.token_verifier.classify(token).await {
        TokenOutcome::SelfIssuedVerified(claims) => Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.email,
            identity: None,
        }),
        TokenOutcome::ThirdPartyVerified(identity) => {
            let user = state.reconciler.reconcile(&identity).await.map_err(|e| {
                tracing::error!(
                    error = %e,
                    provider = identity.provider.as_str(),
                    "User lookup failed for third-party token"
                );
                match e {
                    AppError::Database(_) | AppError::Internal(_) => e,
                    other => AppError::Database(other.to_string()),
                }
            })?;

            Ok(AuthUser {
                user_id: user.id,
                email: user.email,
                identity: Some(identity),
            })
        }
        TokenOutcome::Invalid => Err(AppError::InvalidToken),
    }
}

fn extract_bearer_token(auth_header: Option<&HeaderValue>) -> Result<&str, AppError> {
    let value = auth_header
        .ok_or(AppError::Unauthorized)?
        .to_str()
        .map_err(|_| AppError::Unauthorized)?;

    value.strip_prefix("Bearer ").ok_or(AppError::Unauthorized)
}
