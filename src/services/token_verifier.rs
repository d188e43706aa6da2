// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bearer token classification.
//!
//! A bearer token is either one of our own session tokens or a hosted
//! provider access token. Both checks run before a token is declared invalid.

use crate::models::ThirdPartyIdentity;
use crate::services::hosted_auth::{HostedAuthClient, IntrospectionError};
use crate::services::session::{SessionClaims, SessionIssuer};

/// Outcome of classifying a bearer token.
#[derive(Debug, Clone)]
pub enum TokenOutcome {
    /// The hosted provider vouched for the token.
    ThirdPartyVerified(ThirdPartyIdentity),
    /// Signed by us and unexpired.
    SelfIssuedVerified(SessionClaims),
    Invalid,
}

#[derive(Clone)]
pub struct TokenVerifier {
    sessions: SessionIssuer,
    hosted_auth: HostedAuthClient,
}

impl TokenVerifier {
    pub fn new(sessions: SessionIssuer, hosted_auth: HostedAuthClient) -> Self {
        Self {
            sessions,
            hosted_auth,
        }
    }

    /// Classify a bearer token.
    ///
    /// The local signature check runs first since it needs no I/O; any
    /// failure there falls through to hosted introspection. Introspection
    /// errors, transient or not, only mean "not a third-party token".
    pub async fn classify(&self, token: &str) -> TokenOutcome {
        let token = token.trim();
        if token.is_empty() {
            return TokenOutcome::Invalid;
        }

        let local_error = match self.sessions.verify(token) {
            Ok(claims) => return TokenOutcome::SelfIssuedVerified(claims),
            Err(e) => e,
        };

        match self.hosted_auth.introspect(token).await {
            Ok(identity) => TokenOutcome::ThirdPartyVerified(identity),
            Err(IntrospectionError::Transient(reason)) => {
                tracing::warn!(
                    reason = %reason,
                    local_error = %local_error,
                    "Hosted introspection unavailable; token not verified"
                );
                TokenOutcome::Invalid
            }
            Err(IntrospectionError::Rejected(reason)) => {
                tracing::debug!(
                    reason = %reason,
                    local_error = %local_error,
                    "Token rejected by both verifiers"
                );
                TokenOutcome::Invalid
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{IdentitySource, NewUser, ProfileAttributes};
    use crate::services::session::SessionLifetime;
    use std::collections::HashMap;

    fn verifier() -> (TokenVerifier, SessionIssuer) {
        let sessions = SessionIssuer::new(&Config::test_default());
        let identity = ThirdPartyIdentity {
            external_user_id: "google-sub".into(),
            email: Some("ann@example.com".into()),
            profile: ProfileAttributes::default(),
            provider: IdentitySource::Google,
        };
        let hosted = HostedAuthClient::new_static(HashMap::from([(
            "hosted-token".to_string(),
            identity,
        )]));
        (TokenVerifier::new(sessions.clone(), hosted), sessions)
    }

    #[tokio::test]
    async fn self_issued_token() {
        let (verifier, sessions) = verifier();
        let user =
            NewUser::new("bob@example.com".into(), "Bob".into(), IdentitySource::Password)
                .into_user();
        let token = sessions.issue(&user, SessionLifetime::Full).unwrap();

        match verifier.classify(&token).await {
            TokenOutcome::SelfIssuedVerified(claims) => {
                assert_eq!(claims.user_id, user.id);
                assert_eq!(claims.email, "bob@example.com");
            }
            other => panic!("expected self-issued, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hosted_token_falls_through_to_introspection() {
        let (verifier, _) = verifier();
        match verifier.classify("hosted-token").await {
            TokenOutcome::ThirdPartyVerified(identity) => {
                assert_eq!(identity.external_user_id, "google-sub");
            }
            other => panic!("expected third-party, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        let (verifier, _) = verifier();
        for token in ["", "   ", "garbage", "a.b.c"] {
            assert!(matches!(
                verifier.classify(token).await,
                TokenOutcome::Invalid
            ));
        }
    }

    #[tokio::test]
    async fn unreachable_provider_still_checks_local() {
        let mut config = Config::test_default();
        config.supabase_url = "http://127.0.0.1:9".to_string();
        let sessions = SessionIssuer::new(&config);
        let verifier = TokenVerifier::new(
            sessions.clone(),
            HostedAuthClient::new(&config).unwrap(),
        );

        assert!(matches!(
            verifier.classify("not-ours").await,
            TokenOutcome::Invalid
        ));

        let user =
            NewUser::new("bob@example.com".into(), "Bob".into(), IdentitySource::Google)
                .into_user();
        let token = sessions.issue(&user, SessionLifetime::Full).unwrap();
        assert!(matches!(
            verifier.classify(&token).await,
            TokenOutcome::SelfIssuedVerified(_)
        ));
    }
}
