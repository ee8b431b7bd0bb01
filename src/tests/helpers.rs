use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::models::user::{Role, User};
use crate::services::auth_service::AuthService;
use crate::services::credential_store::CredentialStore;
use crate::transport::Transport;

pub const API_URL: &str = "http://backend.test/api";
pub const EMAIL: &str = "ada@portal.test";
pub const PASSWORD: &str = "password123";

static INIT: Once = Once::new();

/// Initialize logging exactly once
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_target(false)
            .with_thread_ids(true)
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_max_level(Level::ERROR)
            .with_span_events(FmtSpan::NONE)
            .init();
    });
}

/// In-process stand-in for the job portal backend.
///
/// Protected routes accept exactly one access token at a time. A successful
/// refresh hands out `next_token` and makes it the accepted one.
#[derive(Clone)]
pub struct MockBackend {
    inner: Arc<MockState>,
}

struct MockState {
    user_id: Uuid,
    valid_token: Mutex<String>,
    next_token: Mutex<String>,
    refresh_token: Mutex<String>,
    rotated_refresh_token: Mutex<Option<String>>,
    refresh_delay: Mutex<Duration>,
    refresh_fails: AtomicBool,
    profile_fails: AtomicBool,
    logout_fails: AtomicBool,
    refresh_calls: AtomicUsize,
    active_refreshes: AtomicUsize,
    max_active_refreshes: AtomicUsize,
    login_calls: AtomicUsize,
    register_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    profile_calls: AtomicUsize,
    seen: Mutex<Vec<(String, Option<String>)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockState {
                user_id: Uuid::new_v4(),
                valid_token: Mutex::new("t1".to_string()),
                next_token: Mutex::new("t2".to_string()),
                refresh_token: Mutex::new("r1".to_string()),
                rotated_refresh_token: Mutex::new(None),
                refresh_delay: Mutex::new(Duration::ZERO),
                refresh_fails: AtomicBool::new(false),
                profile_fails: AtomicBool::new(false),
                logout_fails: AtomicBool::new(false),
                refresh_calls: AtomicUsize::new(0),
                active_refreshes: AtomicUsize::new(0),
                max_active_refreshes: AtomicUsize::new(0),
                login_calls: AtomicUsize::new(0),
                register_calls: AtomicUsize::new(0),
                logout_calls: AtomicUsize::new(0),
                profile_calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/register", post(register))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/logout", post(logout))
            .route("/api/auth/forgot-password", post(forgot_password))
            .route("/api/auth/change-password", post(change_password))
            .route("/api/profile/me", get(profile))
            .route("/api/jobs/mine", get(protected).put(update_jobs).delete(delete_jobs))
            .route("/api/always-unauthorized", get(always_unauthorized))
            .route("/api/slow", get(slow))
            .with_state(self.clone())
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.router())
    }

    pub fn user_id(&self) -> Uuid {
        self.inner.user_id
    }

    /// Make the currently issued access token worthless, as if it expired.
    pub fn expire_access_token(&self) {
        *self.inner.valid_token.lock().unwrap() = "expired".to_string();
    }

    pub fn set_next_token(&self, token: &str) {
        *self.inner.next_token.lock().unwrap() = token.to_string();
    }

    pub fn rotate_refresh_token_to(&self, token: &str) {
        *self.inner.rotated_refresh_token.lock().unwrap() = Some(token.to_string());
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.inner.refresh_delay.lock().unwrap() = delay;
    }

    pub fn fail_refresh(&self) {
        self.inner.refresh_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_profile(&self) {
        self.inner.profile_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_logout(&self) {
        self.inner.logout_fails.store(true, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    /// Most refresh calls the backend was handling at the same moment.
    pub fn max_active_refreshes(&self) -> usize {
        self.inner.max_active_refreshes.load(Ordering::SeqCst)
    }

    pub fn login_calls(&self) -> usize {
        self.inner.login_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.inner.register_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.inner.logout_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.inner.profile_calls.load(Ordering::SeqCst)
    }

    /// `Authorization` headers seen per path, in arrival order.
    pub fn seen_auth(&self, path: &str) -> Vec<Option<String>> {
        self.inner
            .seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, auth)| auth.clone())
            .collect()
    }

    fn record(&self, path: &str, headers: &HeaderMap) {
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.inner.seen.lock().unwrap().push((path.to_string(), auth));
    }

    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let valid = self.inner.valid_token.lock().unwrap().clone();
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == valid)
    }

    fn auth_payload(&self) -> Value {
        json!({
            "accessToken": self.inner.valid_token.lock().unwrap().clone(),
            "refreshToken": self.inner.refresh_token.lock().unwrap().clone(),
            "user": {
                "id": self.inner.user_id,
                "email": EMAIL,
                "role": "job_seeker",
                "profile": {"fullName": "Ada From Login"}
            }
        })
    }
}

fn ok(data: Value) -> Response {
    (StatusCode::OK, Json(json!({"success": true, "data": data}))).into_response()
}

fn ok_empty(message: &str) -> Response {
    (StatusCode::OK, Json(json!({"success": true, "message": message}))).into_response()
}

fn fail(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({"success": false, "error": {"code": code, "message": message}})),
    )
        .into_response()
}

fn unauthorized(message: &str) -> Response {
    fail(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
}

async fn login(State(backend): State<MockBackend>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    backend.inner.login_calls.fetch_add(1, Ordering::SeqCst);
    backend.record("/auth/login", &headers);
    if body["email"] != EMAIL || body["password"] != PASSWORD {
        return unauthorized("Incorrect password. 4 attempt(s) remaining");
    }
    ok(backend.auth_payload())
}

async fn register(State(backend): State<MockBackend>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    backend.inner.register_calls.fetch_add(1, Ordering::SeqCst);
    backend.record("/auth/register", &headers);
    if body["email"] == EMAIL {
        return fail(StatusCode::CONFLICT, "CONFLICT", "Email already registered");
    }
    let mut payload = backend.auth_payload();
    payload["user"]["email"] = body["email"].clone();
    (StatusCode::CREATED, Json(json!({"success": true, "data": payload}))).into_response()
}

/// Counts a refresh call as active until its handler finishes or is dropped.
struct ActiveRefresh(MockBackend);

impl ActiveRefresh {
    fn enter(backend: &MockBackend) -> Self {
        let active = backend.inner.active_refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        backend.inner.max_active_refreshes.fetch_max(active, Ordering::SeqCst);
        Self(backend.clone())
    }
}

impl Drop for ActiveRefresh {
    fn drop(&mut self) {
        self.0.inner.active_refreshes.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn refresh(State(backend): State<MockBackend>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    backend.inner.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let _active = ActiveRefresh::enter(&backend);
    backend.record("/auth/refresh", &headers);

    let delay = *backend.inner.refresh_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let accepted = backend.inner.refresh_token.lock().unwrap().clone();
    if backend.inner.refresh_fails.load(Ordering::SeqCst) || body["refreshToken"] != accepted.as_str() {
        return unauthorized("Refresh token is expired or revoked");
    }

    let token = backend.inner.next_token.lock().unwrap().clone();
    *backend.inner.valid_token.lock().unwrap() = token.clone();

    let mut data = json!({"accessToken": token});
    if let Some(rotated) = backend.inner.rotated_refresh_token.lock().unwrap().clone() {
        *backend.inner.refresh_token.lock().unwrap() = rotated.clone();
        data["refreshToken"] = json!(rotated);
    }
    ok(data)
}

async fn logout(State(backend): State<MockBackend>, headers: HeaderMap) -> Response {
    backend.inner.logout_calls.fetch_add(1, Ordering::SeqCst);
    backend.record("/auth/logout", &headers);
    if backend.inner.logout_fails.load(Ordering::SeqCst) {
        return fail(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "database unavailable");
    }
    ok_empty("Logged out successfully")
}

async fn forgot_password(State(backend): State<MockBackend>, headers: HeaderMap) -> Response {
    backend.record("/auth/forgot-password", &headers);
    ok_empty("Password reset email sent")
}

async fn change_password(State(backend): State<MockBackend>, headers: HeaderMap) -> Response {
    backend.record("/auth/change-password", &headers);
    if !backend.is_authorized(&headers) {
        return unauthorized("Authentication failed");
    }
    ok_empty("Password changed successfully")
}

async fn profile(State(backend): State<MockBackend>, headers: HeaderMap) -> Response {
    backend.inner.profile_calls.fetch_add(1, Ordering::SeqCst);
    backend.record("/profile/me", &headers);
    if backend.inner.profile_fails.load(Ordering::SeqCst) {
        return fail(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "profile service down");
    }
    if !backend.is_authorized(&headers) {
        return unauthorized("Authentication failed");
    }
    ok(json!({
        "user": {"id": backend.inner.user_id, "email": EMAIL, "role": "job_seeker"},
        "profile": {"fullName": "Ada Lovelace"}
    }))
}

async fn protected(State(backend): State<MockBackend>, headers: HeaderMap) -> Response {
    backend.record("/jobs/mine", &headers);
    if !backend.is_authorized(&headers) {
        return unauthorized("Authentication failed");
    }
    ok(json!({"jobs": ["Backend Engineer"]}))
}

async fn update_jobs(State(backend): State<MockBackend>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    backend.record("/jobs/mine", &headers);
    if !backend.is_authorized(&headers) {
        return unauthorized("Authentication failed");
    }
    ok(body)
}

async fn delete_jobs(State(backend): State<MockBackend>, headers: HeaderMap) -> Response {
    backend.record("/jobs/mine", &headers);
    if !backend.is_authorized(&headers) {
        return unauthorized("Authentication failed");
    }
    ok_empty("Job listing removed")
}

async fn always_unauthorized(State(backend): State<MockBackend>, headers: HeaderMap) -> Response {
    backend.record("/always-unauthorized", &headers);
    unauthorized("Authentication failed")
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_millis(500)).await;
    ok(json!({}))
}

pub fn test_config() -> ClientConfig {
    ClientConfig::new(API_URL)
        .with_request_timeout(Duration::from_secs(2))
        .with_refresh_timeout(Duration::from_secs(2))
}

pub fn test_user(id: Uuid) -> User {
    User::new(id, EMAIL, "Ada Lovelace", Role::JobSeeker)
}

/// Backend, store and service wired together over the in-process router.
pub struct Harness {
    pub backend: MockBackend,
    pub store: Arc<CredentialStore>,
    pub auth: AuthService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self::with_store(config, Arc::new(CredentialStore::memory()))
    }

    pub fn with_store(config: ClientConfig, store: Arc<CredentialStore>) -> Self {
        init_tracing();
        let backend = MockBackend::new();
        let auth = AuthService::new(&config, store.clone(), backend.transport());
        Self { backend, store, auth }
    }

    /// Store the session the backend would have issued on login: `t1` / `r1`.
    pub fn signed_in(self) -> Self {
        let user = test_user(self.backend.user_id());
        self.store.set_session("t1".to_string(), "r1".to_string(), user);
        self
    }
}

/// An unsigned-by-us JWT with the claim layout the backend uses.
pub fn make_jwt(sub: Uuid, email: &str, role: &str, expires_in_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = json!({
        "sub": sub,
        "email": email,
        "role": role,
        "iat": now,
        "exp": now + expires_in_secs,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"backend-secret")).unwrap()
}
