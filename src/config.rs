use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const FORGOT_PASSWORD_PATH: &str = "/auth/forgot-password";
pub const RESET_PASSWORD_PATH: &str = "/auth/reset-password";
pub const CHANGE_PASSWORD_PATH: &str = "/auth/change-password";
pub const PROFILE_PATH: &str = "/profile/me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a whole number of seconds, got {value:?}")]
    InvalidSeconds { name: &'static str, value: String },
    #[error("API_URL must be an http(s) URL, got {0:?}")]
    InvalidApiUrl(String),
}

/// Settings for the authenticated request pipeline.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every request path is appended to, without a trailing slash.
    pub api_url: String,
    /// Where the session is persisted. `None` keeps it in memory only.
    pub session_file: Option<PathBuf>,
    pub request_timeout: Duration,
    pub refresh_timeout: Duration,
    /// Paths that never carry a bearer token and never trigger a refresh.
    pub exempt_paths: Vec<String>,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            session_file: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            refresh_timeout: Duration::from_secs(DEFAULT_REFRESH_TIMEOUT_SECS),
            exempt_paths: default_exempt_paths(),
        }
    }

    /// Load from the process environment, reading `.env` first if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let api_url = env::var("API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidApiUrl(api_url));
        }

        let mut config = Self::new(api_url);
        config.session_file = env::var("SESSION_FILE").ok().filter(|p| !p.is_empty()).map(PathBuf::from);
        config.request_timeout = seconds_from_env("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        config.refresh_timeout = seconds_from_env("REFRESH_TIMEOUT_SECS", DEFAULT_REFRESH_TIMEOUT_SECS)?;
        Ok(config)
    }

    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_exempt_path(mut self, path: impl Into<String>) -> Self {
        self.exempt_paths.push(path.into());
        self
    }

    /// Absolute URL for a request path such as `/auth/login`.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

fn default_exempt_paths() -> Vec<String> {
    [LOGIN_PATH, REGISTER_PATH, REFRESH_PATH, FORGOT_PASSWORD_PATH, RESET_PASSWORD_PATH]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn seconds_from_env(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidSeconds { name, value }),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}
