pub mod auth;

pub use auth::{bearer_value, ExemptEndpoints, Interceptor};
