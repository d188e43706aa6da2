// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{IdentitySource, Role, User, UserUpdate};
use crate::routes::auth::{session_response, AuthResponse};
use crate::routes::validate_body;
use crate::services::SessionLifetime;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// API routes (require authentication).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/me/profile", put(update_profile))
}

// ─── User Profile ────────────────────────────────────────────

/// Client-facing view of a user. Never carries the password hash.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub profile_picture: Option<String>,
    pub identity_source: IdentitySource,
    pub role: Role,
    pub is_active: bool,
    pub date_of_birth: Option<NaiveDate>,
    pub acquisition_channel: Option<String>,
    pub profile_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let profile_complete = user.profile_complete();
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            username: user.username,
            phone: user.phone,
            profile_picture: user.profile_picture,
            identity_source: user.identity_source,
            role: user.role,
            is_active: user.is_active,
            date_of_birth: user.date_of_birth,
            acquisition_channel: user.acquisition_channel,
            profile_complete,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct MeResponse {
    pub success: bool,
    pub user: UserResponse,
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let user_profile = state
        .db
        .get_user(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    Ok(Json(MeResponse {
        success: true,
        user: UserResponse::from(user_profile),
    }))
}

// ─── Profile Completion ──────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct ProfileRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 100))]
    name: Option<String>,
    #[serde(default)]
    #[validate(length(min = 3, max = 30))]
    username: Option<String>,
    #[serde(default)]
    #[validate(length(min = 7, max = 20))]
    phone: Option<String>,
    #[serde(default)]
    date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    #[validate(length(max = 200))]
    acquisition_channel: Option<String>,
}

impl ProfileRequest {
    fn into_update(self) -> Result<UserUpdate> {
        if let Some(username) = &self.username {
            let valid = username
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
            if !valid {
                return Err(AppError::BadRequest(
                    "username may only contain letters, digits, '_' and '.'".to_string(),
                ));
            }
        }

        if let Some(phone) = &self.phone {
            let digits = phone.trim_start_matches('+');
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(AppError::BadRequest(
                    "phone must be digits with an optional leading '+'".to_string(),
                ));
            }
        }

        if let Some(dob) = self.date_of_birth {
            if dob >= Utc::now().date_naive() {
                return Err(AppError::BadRequest(
                    "date_of_birth must be in the past".to_string(),
                ));
            }
        }

        let name = self.name.map(|n| n.trim().to_string());
        if name.as_deref() == Some("") {
            return Err(AppError::BadRequest("name must not be blank".to_string()));
        }

        let update = UserUpdate {
            name,
            username: self.username.map(|u| u.to_lowercase()),
            phone: self.phone,
            date_of_birth: self.date_of_birth,
            acquisition_channel: self.acquisition_channel.map(|c| c.trim().to_string()),
            ..Default::default()
        };

        if update.name.is_none()
            && update.username.is_none()
            && update.phone.is_none()
            && update.date_of_birth.is_none()
            && update.acquisition_channel.is_none()
        {
            return Err(AppError::BadRequest("No profile fields supplied".to_string()));
        }

        Ok(update)
    }
}

/// Fill in profile details. Returns a fresh session, long-lived once the
/// profile is complete.
async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    payload: std::result::Result<Json<ProfileRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>> {
    let Json(body) = payload?;
    validate_body(&body)?;
    let update = body.into_update()?;

    let user = state.db.update_user(&auth.user_id, &update).await?;

    tracing::info!(
        user_id = %user.id,
        profile_complete = user.profile_complete(),
        "Profile updated"
    );

    let lifetime = SessionLifetime::for_user(&user);
    Ok(Json(session_response(&state, user, lifetime)?))
}
