// src/models/jwt.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::{Role, User, FALLBACK_DISPLAY_NAME};

/// Claims the backend puts into an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,                 // user id
    pub exp: i64,                  // expiration time
    #[serde(default)]
    pub iat: Option<i64>,          // issued at
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Token pair handed out by login, register and refresh.
/// Refresh may or may not rotate the refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl AccessClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Identity carried by the token. Needs both email and role.
    pub fn to_user(&self) -> Option<User> {
        let email = self.email.clone()?;
        let role = self.role?;
        Some(User::new(self.sub, email, FALLBACK_DISPLAY_NAME, role))
    }
}
