use huddle_core::errors::SessionError;
use serde::{Deserialize, Serialize};

/// Inbound request frame.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

/// Response frame, sent only to the requesting connection.
///
/// `{ id, success, result?, error?: { code, message, data?: { kind } } }`
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

pub const PARSE_ERROR: &str = "PARSE_ERROR";

impl RpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(
        id: Option<serde_json::Value>,
        code: impl Into<String>,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(RpcError {
                code: code.into(),
                message: message.into(),
                data,
            }),
        }
    }

    /// Rejection carrying the error's code and taxonomy class.
    pub fn rejected(id: Option<serde_json::Value>, err: &SessionError) -> Self {
        Self::error(
            id,
            err.code(),
            err.to_string(),
            Some(serde_json::json!({ "kind": err.kind() })),
        )
    }

    pub fn from_result(
        id: Option<serde_json::Value>,
        result: Result<serde_json::Value, SessionError>,
    ) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(e) => Self::rejected(id, &e),
        }
    }

    pub fn parse_error() -> Self {
        Self::error(None, PARSE_ERROR, "Parse error", None)
    }
}
