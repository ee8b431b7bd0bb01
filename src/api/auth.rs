use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::{Role, User};

use super::profile::ProfileDetails;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// Body of a successful login or registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<AuthUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub profile: Option<ProfileDetails>,
}

impl AuthUser {
    pub fn to_user(&self) -> User {
        let display_name = ProfileDetails::display_name(self.profile.as_ref());
        User::new(self.id, self.email.clone(), display_name, self.role)
    }
}

impl RegisterRequest {
    pub fn job_seeker(email: impl Into<String>, password: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            role: Role::JobSeeker,
            full_name: full_name.into(),
            company_name: None,
        }
    }

    pub fn employer(
        email: impl Into<String>,
        password: impl Into<String>,
        full_name: impl Into<String>,
        company_name: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            role: Role::Employer,
            full_name: full_name.into(),
            company_name: Some(company_name.into()),
        }
    }

    /// Checks the backend would reject anyway, done before anything is sent.
    pub fn validate(&self) -> Result<(), String> {
        if self.email.trim().is_empty() {
            return Err("email is required".to_string());
        }
        if self.password.is_empty() {
            return Err("password is required".to_string());
        }
        match self.role {
            Role::Admin => Err("admin accounts cannot self-register".to_string()),
            Role::Employer if self.company_name.as_deref().is_none_or(|c| c.trim().is_empty()) => {
                Err("company name is required for employer registration".to_string())
            }
            _ => Ok(()),
        }
    }
}
