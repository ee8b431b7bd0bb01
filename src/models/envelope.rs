use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Error payload of a failed backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Wire shape of every backend response body: `{success, data?, message?, error?}`.
///
/// Never inspected field by field by callers; [`ApiEnvelope::into_result`] turns it
/// into either the payload or the error body.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

impl<T> ApiEnvelope<T> {
    pub fn into_result(self) -> Result<T, ErrorBody> {
        match (self.success, self.data, self.error) {
            (true, Some(data), _) => Ok(data),
            (true, None, _) => Err(ErrorBody {
                code: "MISSING_DATA".to_string(),
                message: self.message.unwrap_or_else(|| "response carried no data".to_string()),
                details: Vec::new(),
            }),
            (false, _, Some(error)) => Err(error),
            (false, _, None) => Err(ErrorBody {
                code: "UNKNOWN".to_string(),
                message: self.message.unwrap_or_else(|| "request failed".to_string()),
                details: Vec::new(),
            }),
        }
    }

    /// Like [`into_result`](Self::into_result) but for endpoints that answer without data.
    pub fn into_unit(self) -> Result<(), ErrorBody> {
        if self.success {
            return Ok(());
        }
        match self.error {
            Some(error) => Err(error),
            None => Err(ErrorBody {
                code: "UNKNOWN".to_string(),
                message: self.message.unwrap_or_else(|| "request failed".to_string()),
                details: Vec::new(),
            }),
        }
    }
}
