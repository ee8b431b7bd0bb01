use serde::Deserialize;
use uuid::Uuid;

use crate::models::user::{Role, User, FALLBACK_DISPLAY_NAME};

/// Body of `GET /profile/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    pub user: ProfileUser,
    #[serde(default)]
    pub profile: Option<ProfileDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

/// The subset of a job seeker or employer profile needed to name the user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDetails {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
}

impl ProfileDetails {
    pub fn display_name(profile: Option<&ProfileDetails>) -> String {
        profile
            .and_then(|p| non_blank(&p.full_name).or_else(|| non_blank(&p.company_name)))
            .unwrap_or(FALLBACK_DISPLAY_NAME)
            .to_string()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ProfileResponse {
    pub fn to_user(&self) -> User {
        User::new(
            self.user.id,
            self.user.email.clone(),
            ProfileDetails::display_name(self.profile.as_ref()),
            self.user.role,
        )
    }
}
