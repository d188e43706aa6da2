// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase (PostgREST) client wrapper with typed user operations.
//!
//! The `users` table must carry a unique constraint on `email`; a duplicate
//! insert comes back as HTTP 409 and is reported as [`AppError::Conflict`].

use crate::config::Config;
use crate::error::AppError;
use crate::models::{NewUser, User, UserUpdate};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// User store backed by the hosted Supabase REST API.
#[derive(Clone)]
pub struct SupabaseDb {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Rest(RestClient),
    /// Rows keyed by email, so uniqueness holds structurally.
    Memory(Arc<DashMap<String, User>>),
    Offline,
}

#[derive(Clone)]
struct RestClient {
    http: reqwest::Client,
    table_url: String,
    service_key: String,
}

impl SupabaseDb {
    /// Create a client for the project's REST endpoint.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::Database(format!("Failed to build HTTP client: {}", e)))?;

        let table_url = format!(
            "{}/rest/v1/{}",
            config.supabase_url.trim_end_matches('/'),
            config.users_table
        );

        tracing::info!(table_url = %table_url, "Configured Supabase user store");

        Ok(Self {
            backend: Backend::Rest(RestClient {
                http,
                table_url,
                service_key: config.supabase_service_key.clone(),
            }),
        })
    }

    /// Process-local store for tests and local development.
    pub fn new_in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(DashMap::new())),
        }
    }

    /// Create a mock client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self {
            backend: Backend::Offline,
        }
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Look up a user by (already normalized) email.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        match &self.backend {
            Backend::Rest(rest) => {
                let rows: Vec<User> = rest
                    .select(&[("email", format!("eq.{email}")), ("limit", "1".to_string())])
                    .await?;
                Ok(rows.into_iter().next())
            }
            Backend::Memory(users) => Ok(users.get(email).map(|u| u.value().clone())),
            Backend::Offline => Err(offline()),
        }
    }

    /// Get a user by local id.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        match &self.backend {
            Backend::Rest(rest) => {
                let rows: Vec<User> = rest
                    .select(&[("id", format!("eq.{user_id}")), ("limit", "1".to_string())])
                    .await?;
                Ok(rows.into_iter().next())
            }
            Backend::Memory(users) => Ok(users
                .iter()
                .find(|entry| entry.value().id == user_id)
                .map(|entry| entry.value().clone())),
            Backend::Offline => Err(offline()),
        }
    }

    /// Insert a new user row.
    ///
    /// Returns [`AppError::Conflict`] if the email is already taken.
    pub async fn insert_user(&self, new_user: &NewUser) -> Result<User, AppError> {
        match &self.backend {
            Backend::Rest(rest) => {
                let response = rest
                    .request(reqwest::Method::POST, &rest.table_url)
                    .header("Prefer", "return=representation")
                    .json(new_user)
                    .send()
                    .await
                    .map_err(|e| AppError::Database(format!("Insert request failed: {}", e)))?;

                if response.status() == StatusCode::CONFLICT {
                    return Err(AppError::Conflict(format!(
                        "User with email {} already exists",
                        new_user.email
                    )));
                }

                let rows: Vec<User> = check_response_json(response).await?;
                rows.into_iter()
                    .next()
                    .ok_or_else(|| AppError::Database("Insert returned no rows".to_string()))
            }
            Backend::Memory(users) => match users.entry(new_user.email.clone()) {
                Entry::Occupied(_) => Err(AppError::Conflict(format!(
                    "User with email {} already exists",
                    new_user.email
                ))),
                Entry::Vacant(slot) => {
                    let user = new_user.clone().into_user();
                    slot.insert(user.clone());
                    Ok(user)
                }
            },
            Backend::Offline => Err(offline()),
        }
    }

    /// Apply a partial update to the user with the given id.
    ///
    /// Returns [`AppError::NotFound`] if no row matched.
    pub async fn update_user(&self, user_id: &str, update: &UserUpdate) -> Result<User, AppError> {
        let mut update = update.clone();
        update.updated_at.get_or_insert_with(chrono::Utc::now);

        match &self.backend {
            Backend::Rest(rest) => {
                let response = rest
                    .request(reqwest::Method::PATCH, &rest.table_url)
                    .query(&[("id", format!("eq.{user_id}"))])
                    .header("Prefer", "return=representation")
                    .json(&update)
                    .send()
                    .await
                    .map_err(|e| AppError::Database(format!("Update request failed: {}", e)))?;

                let rows: Vec<User> = check_response_json(response).await?;
                rows.into_iter()
                    .next()
                    .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
            }
            Backend::Memory(users) => {
                for mut entry in users.iter_mut() {
                    if entry.value().id == user_id {
                        update.apply_to(entry.value_mut());
                        return Ok(entry.value().clone());
                    }
                }
                Err(AppError::NotFound(format!("User {} not found", user_id)))
            }
            Backend::Offline => Err(offline()),
        }
    }

    /// Number of rows carrying this email (0 or 1 while the constraint holds).
    pub async fn count_users_by_email(&self, email: &str) -> Result<usize, AppError> {
        match &self.backend {
            Backend::Rest(rest) => {
                let rows: Vec<serde_json::Value> = rest
                    .select(&[("email", format!("eq.{email}")), ("select", "id".to_string())])
                    .await?;
                Ok(rows.len())
            }
            Backend::Memory(users) => Ok(usize::from(users.contains_key(email))),
            Backend::Offline => Err(offline()),
        }
    }
}

impl RestClient {
    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>, AppError> {
        let mut query: Vec<(&str, String)> = filters.to_vec();
        if !filters.iter().any(|(k, _)| *k == "select") {
            query.push(("select", "*".to_string()));
        }

        let response = self
            .request(reqwest::Method::GET, &self.table_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| AppError::Database(format!("Select request failed: {}", e)))?;

        check_response_json(response).await
    }
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::Database(format!("HTTP {}: {}", status, body)));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::Database(format!("JSON parse error: {}", e)))
}

fn offline() -> AppError {
    AppError::Database("Database not connected (offline mode)".to_string())
}
