use thiserror::Error;

/// Everything a caller of the authenticated pipeline can get back instead of a response.
///
/// `Clone` so a single refresh outcome can be handed to every request waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// A refresh was needed but no refresh token is held. The store is left as it was.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The refresh exchange failed and its session has been cleared, or the session
    /// ended while the exchange ran. Also reported to waiters of a reset refresh.
    #[error("session expired: {0}")]
    RefreshExchangeFailed(String),

    /// Still 401 after one refresh and one retry. Says nothing about the session itself.
    #[error("request still unauthorized after token refresh")]
    RetryAuthorizationFailed,

    /// Any other failure reported by the backend.
    #[error("HTTP {status} {code}: {message}")]
    Upstream {
        status: u16,
        code: String,
        message: String,
    },

    #[error("request timed out")]
    Timeout,

    #[error("transport: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("config: {0}")]
    Config(String),
}

impl ApiError {
    /// True when the error means the local session is gone and the user has to sign in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::RefreshExchangeFailed(_) | ApiError::NoRefreshToken)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ApiError::Decode(format!("token claims: {}", err))
    }
}

impl From<http::Error> for ApiError {
    fn from(err: http::Error) -> Self {
        ApiError::InvalidRequest(err.to_string())
    }
}

impl From<crate::config::ConfigError> for ApiError {
    fn from(err: crate::config::ConfigError) -> Self {
        ApiError::Config(err.to_string())
    }
}
