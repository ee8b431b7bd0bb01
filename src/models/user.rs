use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roles as the backend reports them. Access-token claims carry the uppercase
/// enum name, JSON bodies the lowercase one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "JOB_SEEKER")]
    JobSeeker,
    #[serde(alias = "EMPLOYER")]
    Employer,
    #[serde(alias = "ADMIN")]
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

pub const FALLBACK_DISPLAY_NAME: &str = "User";

impl User {
    pub fn new(id: Uuid, email: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            email: email.into(),
            display_name: display_name.into(),
            role,
        }
    }
}
