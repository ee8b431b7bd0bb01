pub mod envelope;
pub mod jwt;
pub mod user;

pub use envelope::{ApiEnvelope, ErrorBody, FieldError};
pub use jwt::{AccessClaims, AuthTokens};
pub use user::{Role, User};
