use axum::body::Body;
use http::Response;
use serde::{de::DeserializeOwned, Serialize};
use tower::ServiceExt;

use crate::error::ApiError;
use crate::middleware::auth::Interceptor;

use super::request::ApiRequest;
use super::response::{decode_data, decode_unit, read_body};

/// Typed JSON calls against the backend, all routed through the [`Interceptor`].
#[derive(Clone)]
pub struct ApiClient {
    interceptor: Interceptor,
}

impl ApiClient {
    pub fn new(interceptor: Interceptor) -> Self {
        Self { interceptor }
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Send a prepared request and get the raw response back.
    pub async fn send(&self, request: ApiRequest) -> Result<Response<Body>, ApiError> {
        self.interceptor.clone().oneshot(request).await
    }

    /// Send a request and decode the `data` of its envelope.
    pub async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let (status, bytes) = read_body(self.send(request).await?).await?;
        decode_data(status, &bytes)
    }

    /// Send a request whose envelope carries no data.
    pub async fn send_unit(&self, request: ApiRequest) -> Result<(), ApiError> {
        let (status, bytes) = read_body(self.send(request).await?).await?;
        decode_unit(status, &bytes)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.fetch(ApiRequest::get(path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.fetch(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.fetch(ApiRequest::put(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send_unit(ApiRequest::delete(path)).await
    }
}
