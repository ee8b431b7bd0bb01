use jsonwebtoken::{decode, errors::Error as JwtError, Algorithm, DecodingKey, Validation};

use crate::models::jwt::AccessClaims;

/// Literal values a broken session write leaves behind; never sent as credentials.
const UNSET_SENTINELS: [&str; 2] = ["undefined", "null"];

/// Whether `token` is worth sending as a bearer credential at all.
pub fn is_usable_token(token: &str) -> bool {
    let token = token.trim();
    !token.is_empty() && !UNSET_SENTINELS.contains(&token)
}

/// Read the claims of an access token without verifying it.
///
/// The client holds no signing key; the backend stays the judge of validity.
/// This is only used to recover identity and expiry for display and restore.
pub fn peek_claims(token: &str) -> Result<AccessClaims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation).map(|data| data.claims)
}
