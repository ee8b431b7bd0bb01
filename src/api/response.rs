use axum::body::{Body, Bytes};
use http::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::models::envelope::{ApiEnvelope, ErrorBody};

/// Buffer a response body.
pub(crate) async fn read_body(response: Response<Body>) -> Result<(StatusCode, Bytes), ApiError> {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| ApiError::Transport(format!("reading response body: {}", e)))?;
    Ok((status, bytes))
}

/// Decode the payload of a successful envelope, or turn the failure into `ApiError::Upstream`.
pub(crate) fn decode_data<T: DeserializeOwned>(status: StatusCode, bytes: &[u8]) -> Result<T, ApiError> {
    if !status.is_success() {
        return Err(upstream_error(status, bytes));
    }
    let envelope: ApiEnvelope<T> = serde_json::from_slice(bytes)?;
    envelope.into_result().map_err(|body| from_error_body(status, body))
}

/// Like [`decode_data`] for endpoints that return no payload.
pub(crate) fn decode_unit(status: StatusCode, bytes: &[u8]) -> Result<(), ApiError> {
    if !status.is_success() {
        return Err(upstream_error(status, bytes));
    }
    if bytes.is_empty() {
        return Ok(());
    }
    let envelope: ApiEnvelope<serde_json::Value> = serde_json::from_slice(bytes)?;
    envelope.into_unit().map_err(|body| from_error_body(status, body))
}

/// Best-effort description of a failed response: the envelope's error if there is one,
/// otherwise the raw body text.
pub(crate) fn upstream_error(status: StatusCode, bytes: &[u8]) -> ApiError {
    match serde_json::from_slice::<ApiEnvelope<serde_json::Value>>(bytes).map(|e| e.into_unit()) {
        Ok(Err(body)) => from_error_body(status, body),
        _ => ApiError::Upstream {
            status: status.as_u16(),
            code: status
                .canonical_reason()
                .unwrap_or("HTTP_ERROR")
                .to_uppercase()
                .replace(' ', "_"),
            message: String::from_utf8_lossy(bytes).trim().to_string(),
        },
    }
}

fn from_error_body(status: StatusCode, body: ErrorBody) -> ApiError {
    ApiError::Upstream {
        status: status.as_u16(),
        code: body.code,
        message: body.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_decode_data_success() {
        let body = json!({"success": true, "data": {"accessToken": "t1"}}).to_string();
        let data: Value = decode_data(StatusCode::OK, body.as_bytes()).unwrap();
        assert_eq!(data["accessToken"], "t1");
    }

    #[test]
    fn test_decode_data_error_envelope() {
        let body = json!({
            "success": false,
            "error": {"code": "FORBIDDEN", "message": "nope"}
        })
        .to_string();
        let err = decode_data::<Value>(StatusCode::FORBIDDEN, body.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            ApiError::Upstream {
                status: 403,
                code: "FORBIDDEN".to_string(),
                message: "nope".to_string(),
            }
        );
    }

    #[test]
    fn test_success_status_with_failed_envelope() {
        let body = json!({"success": false, "message": "quota reached"}).to_string();
        let err = decode_unit(StatusCode::OK, body.as_bytes()).unwrap_err();
        assert!(matches!(err, ApiError::Upstream { status: 200, ref message, .. } if message == "quota reached"));
    }

    #[test]
    fn test_plain_text_failure() {
        let err = upstream_error(StatusCode::BAD_GATEWAY, b"upstream down");
        assert_eq!(
            err,
            ApiError::Upstream {
                status: 502,
                code: "BAD_GATEWAY".to_string(),
                message: "upstream down".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_unit_empty_body() {
        assert!(decode_unit(StatusCode::NO_CONTENT, b"").is_ok());
    }
}
