//! Verified third-party identity (never persisted on its own).

use serde::{Deserialize, Serialize};

use super::user::IdentitySource;

/// Profile attributes a provider may hand back alongside the subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileAttributes {
    pub full_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileAttributes {
    /// Full name if given, otherwise given + family name; `None` if neither.
    pub fn display_name(&self) -> Option<String> {
        if let Some(full) = non_empty(self.full_name.as_deref()) {
            return Some(full.to_string());
        }

        let parts: Vec<&str> = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .filter_map(non_empty)
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    pub fn avatar(&self) -> Option<&str> {
        non_empty(self.avatar_url.as_deref())
    }
}

/// Identity proven by a third-party token for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThirdPartyIdentity {
    /// Provider subject (`sub`)
    pub external_user_id: String,
    /// Apple omits this on repeat authorizations
    pub email: Option<String>,
    pub profile: ProfileAttributes,
    pub provider: IdentitySource,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
