//! JSON-RPC 2.0 wire-format types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors;

/// Protocol version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Outgoing request or notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name (e.g. `Plotly.newPlot`).
    pub method: String,
    /// Parameters, passed through untouched.
    #[serde(default)]
    pub params: Value,
    /// Request identifier. Absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl RpcRequest {
    /// Build a call expecting a response.
    pub fn call(method: impl Into<String>, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
            id: Some(Value::from(id)),
        }
    }

    /// Build a notification.
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
            id: None,
        }
    }

    /// Whether this request expects no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Response to a call. Exactly one of `result` and `error` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echoed request identifier, `null` when it could not be determined.
    pub id: Value,
    /// Result payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// The `error` member of a failed response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Numeric error code (see [`errors`]).
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Extra data, `null` when there is none.
    #[serde(default)]
    pub data: Value,
}

impl RpcResponse {
    /// Build a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self::from_error_body(
            id,
            RpcErrorBody {
                code,
                message: message.into(),
                data: Value::Null,
            },
        )
    }

    /// Build an error response from a prepared body.
    pub fn from_error_body(id: Value, body: RpcErrorBody) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(body),
        }
    }

    /// Whether this is an error response.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl RpcErrorBody {
    /// Whether the code is one of the reserved protocol codes.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self.code,
            errors::PARSE_ERROR
                | errors::INVALID_REQUEST
                | errors::METHOD_NOT_FOUND
                | errors::INVALID_PARAMS
                | errors::INTERNAL_ERROR
        )
    }
}
