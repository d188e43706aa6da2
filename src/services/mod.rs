// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - authentication and identity logic.

pub mod apple;
pub mod hosted_auth;
pub mod password;
pub mod reconciler;
pub mod session;
pub mod token_verifier;

pub use apple::{AppleIdTokenVerifier, AppleNameHint, OidcError};
pub use hosted_auth::{HostedAuthClient, IntrospectionError};
pub use reconciler::IdentityReconciler;
pub use session::{SessionClaims, SessionIssuer, SessionLifetime};
pub use token_verifier::{TokenOutcome, TokenVerifier};
