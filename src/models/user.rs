//! User model for storage and API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Fallback display name when a provider supplies none.
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// Which authentication method last established or updated a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// Email + password signup
    Password,
    /// Google via the hosted OAuth provider
    Google,
    /// Apple via the hosted OAuth provider
    Apple,
    /// Apple ID token from the native iOS flow, verified locally
    AppleNative,
}

impl IdentitySource {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentitySource::Password => "password",
            IdentitySource::Google => "google",
            IdentitySource::Apple => "apple",
            IdentitySource::AppleNative => "apple_native",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Canonical user row (Supabase `users` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable local identifier (UUID v4)
    pub id: String,
    /// Unique, lowercase
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    pub identity_source: IdentitySource,
    #[serde(default)]
    pub role: Role,
    pub is_active: bool,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    /// Free text: where the user heard about the app
    #[serde(default)]
    pub acquisition_channel: Option<String>,
    /// Argon2 PHC string; only password accounts carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A freshly signed-up account has not filled in its profile yet.
    pub fn profile_complete(&self) -> bool {
        self.username.is_some() && self.date_of_birth.is_some()
    }
}

/// Insert payload for a new user row.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    pub identity_source: IdentitySource,
    pub role: Role,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewUser {
    /// New active standard user with a generated id.
    pub fn new(email: String, name: String, identity_source: IdentitySource) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            name,
            profile_picture: None,
            identity_source,
            role: Role::User,
            is_active: true,
            password_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Materialize the row as the store would return it.
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            name: self.name,
            username: None,
            phone: None,
            profile_picture: self.profile_picture,
            identity_source: self.identity_source,
            role: self.role,
            is_active: self.is_active,
            date_of_birth: None,
            acquisition_channel: None,
            password_hash: self.password_hash,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Partial update; `None` fields are left untouched.
///
/// `id` and `email` never change after creation and have no field here.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_source: Option<IdentitySource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition_channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserUpdate {
    /// Apply this patch to an in-memory row.
    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(username) = &self.username {
            user.username = Some(username.clone());
        }
        if let Some(phone) = &self.phone {
            user.phone = Some(phone.clone());
        }
        if let Some(picture) = &self.profile_picture {
            user.profile_picture = Some(picture.clone());
        }
        if let Some(source) = self.identity_source {
            user.identity_source = source;
        }
        if let Some(active) = self.is_active {
            user.is_active = active;
        }
        if let Some(dob) = self.date_of_birth {
            user.date_of_birth = Some(dob);
        }
        if let Some(channel) = &self.acquisition_channel {
            user.acquisition_channel = Some(channel.clone());
        }
        user.updated_at = self.updated_at.unwrap_or_else(Utc::now);
    }
}

/// Trim and lowercase an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
