// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Maps a verified third-party identity onto exactly one local user.
//!
//! Find-or-create keyed on the normalized email, then refresh the mutable
//! profile fields. Repeated calls with the same identity return the same id.

use crate::config::Config;
use crate::db::SupabaseDb;
use crate::error::AppError;
use crate::models::user::{normalize_email, DEFAULT_DISPLAY_NAME};
use crate::models::{NewUser, ThirdPartyIdentity, User, UserUpdate};

#[derive(Clone)]
pub struct IdentityReconciler {
    db: SupabaseDb,
    placeholder_email_domain: String,
}

impl IdentityReconciler {
    pub fn new(db: SupabaseDb, config: &Config) -> Self {
        Self {
            db,
            placeholder_email_domain: config.placeholder_email_domain.clone(),
        }
    }

    /// Email the local user is keyed on.
    ///
    /// Apple may omit the email after the first authorization; the subject id
    /// is stable, so it stands in for the mailbox.
    pub fn canonical_email(&self, identity: &ThirdPartyIdentity) -> String {
        match identity.email.as_deref().map(normalize_email) {
            Some(email) if !email.is_empty() => email,
            _ => format!(
                "{}@{}",
                identity.external_user_id.trim().to_lowercase(),
                self.placeholder_email_domain
            ),
        }
    }

    /// Find or create the local user for this identity and refresh its profile.
    pub async fn reconcile(&self, identity: &ThirdPartyIdentity) -> Result<User, AppError> {
        let email = self.canonical_email(identity);

        if let Some(existing) = self.db.find_user_by_email(&email).await? {
            return self.refresh(&existing, identity).await;
        }

        let mut new_user = NewUser::new(
            email.clone(),
            identity
                .profile
                .display_name()
                .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            identity.provider,
        );
        new_user.profile_picture = identity.profile.avatar().map(str::to_string);

        match self.db.insert_user(&new_user).await {
            Ok(user) => {
                tracing::info!(
                    user_id = %user.id,
                    provider = identity.provider.as_str(),
                    "Provisioned user from third-party identity"
                );
                Ok(user)
            }
            Err(AppError::Conflict(_)) => {
                // A concurrent request created the row between our lookup and insert.
                tracing::debug!(
                    provider = identity.provider.as_str(),
                    "Lost insert race, refreshing existing user"
                );
                let existing = self.db.find_user_by_email(&email).await?.ok_or_else(|| {
                    AppError::Database("User vanished after insert conflict".to_string())
                })?;
                self.refresh(&existing, identity).await
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh(
        &self,
        existing: &User,
        identity: &ThirdPartyIdentity,
    ) -> Result<User, AppError> {
        let update = UserUpdate {
            name: identity.profile.display_name(),
            profile_picture: identity.profile.avatar().map(str::to_string),
            identity_source: Some(identity.provider),
            is_active: Some(true),
            ..Default::default()
        };

        let user = self.db.update_user(&existing.id, &update).await?;

        tracing::debug!(
            user_id = %user.id,
            provider = identity.provider.as_str(),
            "Refreshed user from third-party identity"
        );

        Ok(user)
    }
}
