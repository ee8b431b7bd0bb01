//! Authenticated request pipeline for the job portal API.
//!
//! Three pieces cooperate:
//!
//! - [`CredentialStore`] holds the access token, refresh token and signed-in user,
//!   optionally persisted through a [`storage::SessionStorage`] backend.
//! - [`RefreshCoordinator`] performs the refresh-token exchange at most once at a
//!   time and hands the result to everyone waiting on it.
//! - [`Interceptor`] attaches the bearer token to outgoing requests and retries a
//!   request once after a 401 has been answered by a successful refresh.
//!
//! [`AuthService`] wires them together and adds login, registration and logout.

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod storage;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;

pub use api::{ApiClient, ApiRequest};
pub use config::ClientConfig;
pub use error::ApiError;
pub use middleware::{ExemptEndpoints, Interceptor};
pub use models::{Role, User};
pub use services::{AuthService, Credential, CredentialStore, RefreshCoordinator, UserStream};
pub use transport::{HttpTransport, Transport};
