// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Learnpoints API: authentication core for the learning/rewards app.
//!
//! Accepts either self-issued session tokens or hosted-provider access
//! tokens and resolves both to one canonical local user.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::SupabaseDb;
use services::{
    AppleIdTokenVerifier, HostedAuthClient, IdentityReconciler, SessionIssuer, TokenVerifier,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: SupabaseDb,
    pub sessions: SessionIssuer,
    pub token_verifier: TokenVerifier,
    pub reconciler: IdentityReconciler,
    pub apple_verifier: Arc<AppleIdTokenVerifier>,
}

impl AppState {
    /// Wire the services around a store and the two external verifiers.
    pub fn new(
        config: Config,
        db: SupabaseDb,
        hosted_auth: HostedAuthClient,
        apple_verifier: Arc<AppleIdTokenVerifier>,
    ) -> Self {
        let sessions = SessionIssuer::new(&config);
        let token_verifier = TokenVerifier::new(sessions.clone(), hosted_auth);
        let reconciler = IdentityReconciler::new(db.clone(), &config);

        Self {
            config,
            db,
            sessions,
            token_verifier,
            reconciler,
            apple_verifier,
        }
    }
}
