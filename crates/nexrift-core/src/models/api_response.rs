//! Generic API response wrapper for consistent response structures.

use serde::{Deserialize, Serialize};

/// Generic API response wrapper.
///
/// Provides consistent `success` and `error` fields for all API responses,
/// with the actual data flattened into the response structure.
///
/// # Example
///
/// ```ignore
/// use nexrift_core::models::ApiResponse;
///
/// let response = ApiResponse::success(start_response);
/// let failed: ApiResponse<StartResponse> = ApiResponse::error("App is already running");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error kind, see `NexriftError::kind`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response with data.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            error: None,
            kind: None,
            data: Some(data),
        }
    }

    /// Create an error response without data.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            kind: None,
            data: None,
        }
    }

    /// Create an error response from a supervisor error.
    pub fn from_error(err: &crate::NexriftError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            kind: Some(err.kind().to_string()),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    /// Create a successful response without data (for void operations).
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            kind: None,
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Started {
        pid: u32,
    }

    #[test]
    fn test_success_flattens_data() {
        let value = serde_json::to_value(ApiResponse::success(Started { pid: 42 })).unwrap();
        assert_eq!(value, json!({"success": true, "pid": 42}));
    }

    #[test]
    fn test_error_from_nexrift_error() {
        let err = crate::NexriftError::NotRunning {
            app_id: "comfyui".into(),
        };
        let value = serde_json::to_value(ApiResponse::<()>::from_error(&err)).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["kind"], "not_running");
        assert_eq!(value["error"], "App is not running: comfyui");
    }
}
