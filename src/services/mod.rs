pub mod auth_service;
pub mod credential_store;
pub mod refresh_coordinator;

pub use auth_service::AuthService;
pub use credential_store::{Credential, CredentialStore, UserStream};
pub use refresh_coordinator::RefreshCoordinator;
