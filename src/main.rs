// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Learnpoints API Server
//!
//! Authenticates app users with email + password, Sign in with Apple, or
//! hosted Google/Apple sessions, and issues its own session tokens.

use learnpoints_api::{
    config::Config,
    db::SupabaseDb,
    services::{AppleIdTokenVerifier, HostedAuthClient},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Learnpoints API");

    let db = SupabaseDb::new(&config)?;
    tracing::info!(
        supabase_url = %config.supabase_url,
        table = %config.users_table,
        "Supabase client initialized"
    );

    let hosted_auth = HostedAuthClient::new(&config)?;
    let apple_verifier = Arc::new(AppleIdTokenVerifier::new(&config)?);

    let state = Arc::new(AppState::new(config.clone(), db, hosted_auth, apple_verifier));

    let app = learnpoints_api::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("learnpoints_api=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
