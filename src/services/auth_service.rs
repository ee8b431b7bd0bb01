use std::sync::Arc;

use chrono::{DateTime, Utc};
use http::HeaderValue;
use tracing::{info, instrument, warn};

use crate::api::auth::{
    AuthResponse, AuthUser, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest,
    ResetPasswordRequest,
};
use crate::api::client::ApiClient;
use crate::api::profile::ProfileResponse;
use crate::api::request::ApiRequest;
use crate::api::response::{decode_data, read_body};
use crate::config::{
    ClientConfig, CHANGE_PASSWORD_PATH, FORGOT_PASSWORD_PATH, LOGIN_PATH, LOGOUT_PATH, PROFILE_PATH,
    REGISTER_PATH, RESET_PASSWORD_PATH,
};
use crate::error::ApiError;
use crate::middleware::auth::{bearer_value, Interceptor};
use crate::models::user::User;
use crate::services::credential_store::{CredentialStore, UserStream};
use crate::services::refresh_coordinator::RefreshCoordinator;
use crate::storage::FileStorage;
use crate::transport::Transport;
use crate::utils::jwt;

/// Session lifecycle on top of the authenticated pipeline: sign in, sign out,
/// and keeping the stored user in step with the backend profile.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<CredentialStore>,
    coordinator: RefreshCoordinator,
    client: ApiClient,
}

impl AuthService {
    pub fn new(config: &ClientConfig, store: Arc<CredentialStore>, transport: Arc<dyn Transport>) -> Self {
        let coordinator = RefreshCoordinator::new(store.clone(), transport.clone(), config);
        let interceptor = Interceptor::new(store.clone(), coordinator.clone(), transport, config);

        Self {
            store,
            coordinator,
            client: ApiClient::new(interceptor),
        }
    }

    /// Wire everything up from configuration, restoring a persisted session if one is configured.
    pub fn from_config(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let store = match &config.session_file {
            Some(path) => CredentialStore::load(Box::new(FileStorage::new(path))),
            None => CredentialStore::memory(),
        };
        Self::new(config, Arc::new(store), transport)
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Client for every other backend call.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn current_user(&self) -> Option<User> {
        self.store.user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    pub fn observe_user(&self) -> UserStream {
        self.store.observe_user()
    }

    /// Expiry claimed by the current access token, if it is a readable JWT.
    pub fn access_token_expires_at(&self) -> Option<DateTime<Utc>> {
        let token = self.store.access_token()?;
        jwt::peek_claims(&token).ok()?.expires_at()
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<User, ApiError> {
        let auth: AuthResponse = self.client.post(LOGIN_PATH, &request).await?;
        self.establish(auth).await
    }

    #[instrument(skip(self, request), fields(email = %request.email, role = ?request.role))]
    pub async fn register(&self, request: RegisterRequest) -> Result<User, ApiError> {
        request.validate().map_err(ApiError::InvalidRequest)?;
        let auth: AuthResponse = self.client.post(REGISTER_PATH, &request).await?;
        self.establish(auth).await
    }

    /// Refresh the stored user from `GET /profile/me`.
    #[instrument(skip(self))]
    pub async fn fetch_profile(&self) -> Result<User, ApiError> {
        let profile: ProfileResponse = self.client.get(PROFILE_PATH).await?;
        let user = profile.to_user();
        if !self.store.update_user(user.clone()) {
            warn!("Profile arrived after the session ended, not storing it");
        }
        Ok(user)
    }

    /// End the session. Local credentials are gone before the backend is told;
    /// whether the backend hears about it does not matter to the caller.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let bearer = self.store.access_token().as_deref().and_then(bearer_value);
        self.store.clear();

        let Some(bearer) = bearer else {
            return;
        };
        match self
            .client
            .interceptor()
            .send_with_bearer(ApiRequest::post(LOGOUT_PATH), Some(&bearer))
            .await
        {
            Ok(response) if response.status().is_success() => info!("Server session revoked"),
            Ok(response) => warn!(status = %response.status(), "Server refused logout"),
            Err(e) => warn!(error = %e, "Server logout failed"),
        }
    }

    /// The backend said the session is no longer valid.
    pub fn invalidate_session(&self) {
        warn!("Session invalidated by server");
        self.store.clear();
    }

    #[instrument(skip_all)]
    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<(), ApiError> {
        let body = ChangePasswordRequest {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };
        self.client
            .send_unit(ApiRequest::post(CHANGE_PASSWORD_PATH).json(&body)?)
            .await
    }

    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let body = ForgotPasswordRequest {
            email: email.to_string(),
        };
        self.client
            .send_unit(ApiRequest::post(FORGOT_PASSWORD_PATH).json(&body)?)
            .await
    }

    #[instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ApiError> {
        let body = ResetPasswordRequest {
            token: token.to_string(),
            new_password: new_password.to_string(),
        };
        self.client
            .send_unit(ApiRequest::post(RESET_PASSWORD_PATH).json(&body)?)
            .await
    }

    /* ---------- PRIVATE HELPERS ---------- */

    /// Turn a login/registration response into the stored session.
    ///
    /// The user comes from the profile endpoint when reachable, else from the
    /// response itself, else from the token claims. Nothing is stored unless
    /// one of them works.
    async fn establish(&self, auth: AuthResponse) -> Result<User, ApiError> {
        let bearer = bearer_value(&auth.access_token)
            .ok_or_else(|| ApiError::Decode("sign-in returned an unusable access token".to_string()))?;
        let refresh_token = auth
            .refresh_token
            .clone()
            .filter(|t| jwt::is_usable_token(t))
            .ok_or_else(|| ApiError::Decode("sign-in returned no refresh token".to_string()))?;

        let user = match self.profile_with(&bearer).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Profile fetch after sign-in failed, falling back to token identity");
                auth.user
                    .as_ref()
                    .map(AuthUser::to_user)
                    .or_else(|| jwt::peek_claims(&auth.access_token).ok().and_then(|c| c.to_user()))
                    .ok_or(e)?
            }
        };

        self.store.set_session(auth.access_token, refresh_token, user.clone());
        Ok(user)
    }

    async fn profile_with(&self, bearer: &HeaderValue) -> Result<User, ApiError> {
        let response = self
            .client
            .interceptor()
            .send_with_bearer(ApiRequest::get(PROFILE_PATH), Some(bearer))
            .await?;
        let (status, bytes) = read_body(response).await?;
        let profile: ProfileResponse = decode_data(status, &bytes)?;
        Ok(profile.to_user())
    }
}
