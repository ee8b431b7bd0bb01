pub mod auth;
pub mod client;
pub mod profile;
pub mod request;
pub(crate) mod response;

pub use client::ApiClient;
pub use request::ApiRequest;
