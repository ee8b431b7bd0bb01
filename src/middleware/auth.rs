use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use http::{HeaderValue, Response, StatusCode};
use tower::Service;
use tracing::{debug, info, instrument, warn};

use crate::api::request::{route_of, ApiRequest};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::services::credential_store::CredentialStore;
use crate::services::refresh_coordinator::RefreshCoordinator;
use crate::transport::Transport;
use crate::utils::jwt;

/// `Authorization` value for `token`, or `None` if the token is not worth sending.
pub fn bearer_value(token: &str) -> Option<HeaderValue> {
    if !jwt::is_usable_token(token) {
        return None;
    }
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim())).ok()?;
    value.set_sensitive(true);
    Some(value)
}

/// Endpoints that are called without credentials: login, registration, the
/// refresh exchange itself. They never get a bearer header and a 401 from them
/// never triggers a refresh.
#[derive(Debug, Clone)]
pub struct ExemptEndpoints {
    paths: Vec<String>,
}

impl ExemptEndpoints {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: paths.into_iter().map(|p| normalize(p.as_ref()).to_string()).collect(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        let path = normalize(path);
        self.paths.iter().any(|p| p == path)
    }
}

fn normalize(path: &str) -> &str {
    let route = route_of(path);
    match route.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Attaches the current access token to outgoing requests and recovers from a
/// single 401 per request by refreshing and retrying once.
///
/// Holds no session state of its own. Usable directly through [`Interceptor::send`]
/// or as a `tower::Service<ApiRequest>`.
#[derive(Clone)]
pub struct Interceptor {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<CredentialStore>,
    coordinator: RefreshCoordinator,
    transport: Arc<dyn Transport>,
    exempt: ExemptEndpoints,
    api_url: String,
    request_timeout: Duration,
}

impl Interceptor {
    pub fn new(
        store: Arc<CredentialStore>,
        coordinator: RefreshCoordinator,
        transport: Arc<dyn Transport>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                coordinator,
                transport,
                exempt: ExemptEndpoints::new(&config.exempt_paths),
                api_url: config.api_url.clone(),
                request_timeout: config.request_timeout,
            }),
        }
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.inner.exempt.contains(path)
    }

    /// Send `request`, returning whatever the backend answered unless it was a 401
    /// on a protected endpoint, which is retried once after a refresh.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.route()))]
    pub async fn send(&self, request: ApiRequest) -> Result<Response<Body>, ApiError> {
        let inner = &self.inner;

        if inner.exempt.contains(&request.path) {
            debug!("Exempt endpoint, sending without credentials");
            return inner.dispatch(&request, None).await;
        }

        let attached = inner.store.access_token().filter(|t| bearer_value(t).is_some());
        let bearer = attached.as_deref().and_then(bearer_value);
        if bearer.is_none() {
            warn!("No valid access token for request");
        }

        let response = inner.dispatch(&request, bearer.as_ref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        info!("Access token rejected, refreshing");
        let fresh = inner.coordinator.refresh_rejected(attached.as_deref()).await?;
        let bearer = bearer_value(&fresh).ok_or_else(|| {
            ApiError::RefreshExchangeFailed("refreshed access token is unusable".to_string())
        })?;

        let retried = inner.dispatch(&request, Some(&bearer)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!("Request still unauthorized after refresh");
            return Err(ApiError::RetryAuthorizationFailed);
        }
        Ok(retried)
    }

    /// Send with exactly the given credential, bypassing the store and the refresh path.
    /// Used while a session is being set up or torn down.
    pub async fn send_with_bearer(
        &self,
        request: ApiRequest,
        bearer: Option<&HeaderValue>,
    ) -> Result<Response<Body>, ApiError> {
        self.inner.dispatch(&request, bearer).await
    }
}

impl Inner {
    async fn dispatch(&self, request: &ApiRequest, bearer: Option<&HeaderValue>) -> Result<Response<Body>, ApiError> {
        let http_request = request.to_http(&self.api_url, bearer)?;
        let timeout = request.timeout.unwrap_or(self.request_timeout);

        match tokio::time::timeout(timeout, self.transport.send(http_request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ApiError::Transport(e.to_string())),
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Request timed out");
                Err(ApiError::Timeout)
            }
        }
    }
}

impl Service<ApiRequest> for Interceptor {
    type Response = Response<Body>;
    type Error = ApiError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ApiRequest) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { this.send(request).await })
    }
}
