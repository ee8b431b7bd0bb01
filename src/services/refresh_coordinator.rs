use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

use crate::api::auth::RefreshTokenRequest;
use crate::api::request::ApiRequest;
use crate::api::response::{decode_data, read_body};
use crate::config::{ClientConfig, REFRESH_PATH};
use crate::error::ApiError;
use crate::middleware::auth::bearer_value;
use crate::models::jwt::AuthTokens;
use crate::services::credential_store::CredentialStore;
use crate::transport::Transport;
use crate::utils::jwt;

type Waiter = oneshot::Sender<Result<String, ApiError>>;

/// Single-flight owner of the refresh-token exchange.
///
/// At most one exchange is outstanding. Everyone who asks while it runs, the
/// caller that started it included, waits on the same outcome. The exchange
/// itself runs in its own task, so a waiter giving up affects nobody else.
/// [`reset`](Self::reset) aborts that task before a new cycle can start.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<CredentialStore>,
    transport: Arc<dyn Transport>,
    api_url: String,
    timeout: Duration,
    state: Mutex<RefreshState>,
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    // Bumped for every cycle and on reset; an exchange may only settle its own cycle.
    cycle: u64,
    waiters: Vec<Waiter>,
    task: Option<AbortHandle>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<CredentialStore>, transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                transport,
                api_url: config.api_url.clone(),
                timeout: config.refresh_timeout,
                state: Mutex::new(RefreshState::default()),
            }),
        }
    }

    /// Obtain a fresh access token, joining an exchange already under way.
    pub async fn request_refresh(&self) -> Result<String, ApiError> {
        let refresh_token = self
            .inner
            .store
            .refresh_token()
            .filter(|t| jwt::is_usable_token(t))
            .ok_or(ApiError::NoRefreshToken)?;

        let rx = self.join_or_start(refresh_token);
        rx.await
            .unwrap_or_else(|_| Err(ApiError::RefreshExchangeFailed("refresh was abandoned".to_string())))
    }

    /// Refresh after the backend rejected `rejected` (the token the request carried,
    /// if any). When the store already holds a different usable token, some other
    /// request refreshed in the meantime and that token is returned as is.
    pub async fn refresh_rejected(&self, rejected: Option<&str>) -> Result<String, ApiError> {
        if !self.is_refreshing() {
            if let Some(current) = self.inner.store.access_token() {
                if jwt::is_usable_token(&current) && Some(current.as_str()) != rejected {
                    debug!("Access token already replaced, skipping refresh");
                    return Ok(current);
                }
            }
        }
        self.request_refresh().await
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.state().in_flight
    }

    /// Abandon the current cycle, failing its waiters, and go back to idle.
    /// The outstanding exchange task is aborted, so a new cycle never runs next to it.
    pub fn reset(&self) {
        let (waiters, task) = {
            let mut state = self.inner.state();
            state.cycle += 1;
            state.in_flight = false;
            (std::mem::take(&mut state.waiters), state.task.take())
        };
        if let Some(task) = task {
            task.abort();
        }
        if !waiters.is_empty() {
            warn!(waiters = waiters.len(), "Refresh state reset with waiters pending");
        }
        for waiter in waiters {
            let _ = waiter.send(Err(ApiError::RefreshExchangeFailed("refresh state reset".to_string())));
        }
    }

    fn join_or_start(&self, refresh_token: String) -> oneshot::Receiver<Result<String, ApiError>> {
        let (tx, rx) = oneshot::channel();
        let cycle = {
            let mut state = self.inner.state();
            state.waiters.push(tx);
            if state.in_flight {
                debug!(waiters = state.waiters.len(), "Joining in-flight refresh");
                return rx;
            }
            state.in_flight = true;
            state.cycle += 1;
            state.cycle
        };

        let task = tokio::spawn(run_exchange(self.inner.clone(), cycle, refresh_token)).abort_handle();
        let mut state = self.inner.state();
        if state.cycle == cycle && state.in_flight {
            state.task = Some(task);
        } else {
            // Already reset or settled before the handle could be recorded.
            task.abort();
        }
        rx
    }
}

#[instrument(skip(inner, refresh_token))]
async fn run_exchange(inner: Arc<Inner>, cycle: u64, refresh_token: String) {
    let mut guard = SettleGuard {
        inner: inner.clone(),
        cycle,
        settled: false,
    };

    info!("Exchanging refresh token");
    let exchanged = match tokio::time::timeout(inner.timeout, inner.exchange(&refresh_token)).await {
        Ok(result) => result.map_err(exchange_failed),
        Err(_) => Err(ApiError::RefreshExchangeFailed("refresh timed out".to_string())),
    };

    // Storage writes may touch the disk; keep them off the async workers.
    let store = inner.store.clone();
    let outcome = match exchanged {
        Ok(tokens) => {
            let access_token = tokens.access_token.clone();
            let applied = tokio::task::spawn_blocking(move || {
                store.apply_refresh(&refresh_token, tokens.access_token, tokens.refresh_token)
            })
            .await;
            match applied {
                Ok(true) => {
                    info!("Access token refreshed");
                    Ok(access_token)
                }
                Ok(false) => superseded(&inner),
                Err(e) => Err(ApiError::RefreshExchangeFailed(format!("storing refreshed token: {}", e))),
            }
        }
        Err(e) => {
            warn!(error = %e, "Token refresh failed, clearing session");
            let cleared = tokio::task::spawn_blocking(move || store.clear_if_refresh_token(&refresh_token)).await;
            match cleared {
                Ok(false) => superseded(&inner),
                _ => Err(e),
            }
        }
    };

    guard.settle(outcome);
}

/// Outcome for an exchange whose session was replaced or ended while it ran.
/// Waiters continue with the newer session if there is one.
fn superseded(inner: &Inner) -> Result<String, ApiError> {
    match inner.store.access_token().filter(|t| jwt::is_usable_token(t)) {
        Some(current) => {
            warn!("Session changed while refreshing, handing out the current token");
            Ok(current)
        }
        None => {
            warn!("Session ended while refreshing");
            Err(ApiError::RefreshExchangeFailed("session ended during refresh".to_string()))
        }
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// One refresh call straight to the transport; it must never pass through the interceptor.
    async fn exchange(&self, refresh_token: &str) -> Result<AuthTokens, ApiError> {
        let request = ApiRequest::post(REFRESH_PATH).json(&RefreshTokenRequest { refresh_token })?;
        let response = self
            .transport
            .send(request.to_http(&self.api_url, None)?)
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let (status, bytes) = read_body(response).await?;
        let tokens: AuthTokens = decode_data(status, &bytes)?;

        if bearer_value(&tokens.access_token).is_none() {
            return Err(ApiError::RefreshExchangeFailed(
                "backend returned an unusable access token".to_string(),
            ));
        }
        Ok(tokens)
    }

    fn settle(&self, cycle: u64, outcome: Result<String, ApiError>) {
        let waiters = {
            let mut state = self.state();
            if state.cycle != cycle || !state.in_flight {
                debug!(cycle, "Refresh cycle already reset, dropping outcome");
                return;
            }
            state.in_flight = false;
            state.task = None;
            std::mem::take(&mut state.waiters)
        };

        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "Releasing refresh waiters");
        for waiter in waiters {
            // A waiter that went away has nothing left to be told.
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Every way an exchange can fail is reported to waiters as a failed refresh.
fn exchange_failed(err: ApiError) -> ApiError {
    match err {
        ApiError::RefreshExchangeFailed(_) => err,
        other => ApiError::RefreshExchangeFailed(other.to_string()),
    }
}

/// Settles the cycle as failed if the exchange task ends without settling it.
///
/// That happens on panic, abort or runtime shutdown, none of which says anything
/// about the refresh token, so the stored session is left alone.
struct SettleGuard {
    inner: Arc<Inner>,
    cycle: u64,
    settled: bool,
}

impl SettleGuard {
    fn settle(&mut self, outcome: Result<String, ApiError>) {
        self.settled = true;
        self.inner.settle(self.cycle, outcome);
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(cycle = self.cycle, "Refresh task ended without settling");
        self.inner.settle(
            self.cycle,
            Err(ApiError::RefreshExchangeFailed("refresh task aborted".to_string())),
        );
    }
}
