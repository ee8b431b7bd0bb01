use std::time::Duration;

use axum::body::{Body, Bytes};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request};
use serde::Serialize;

use crate::error::ApiError;

/// An outgoing call, kept in a form that can be sent again after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, starting with `/`. May carry a query string.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Overrides the pipeline's default request timeout.
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Serialize `payload` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self, ApiError> {
        self.body = Bytes::from(serde_json::to_vec(payload)?);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The path without query string or fragment.
    pub fn route(&self) -> &str {
        route_of(&self.path)
    }

    /// Build the `http` request to hand to a transport. With `bearer`, any
    /// caller-supplied `Authorization` header is replaced.
    pub(crate) fn to_http(&self, api_url: &str, bearer: Option<&HeaderValue>) -> Result<Request<Body>, ApiError> {
        if !self.path.starts_with('/') {
            return Err(ApiError::InvalidRequest(format!(
                "path must start with '/': {:?}",
                self.path
            )));
        }

        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(format!("{}{}", api_url, self.path))
            .body(Body::from(self.body.clone()))?;

        *request.headers_mut() = self.headers.clone();
        if let Some(bearer) = bearer {
            request.headers_mut().insert(AUTHORIZATION, bearer.clone());
        }
        Ok(request)
    }
}

pub(crate) fn route_of(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}
