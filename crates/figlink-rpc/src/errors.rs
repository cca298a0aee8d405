//! JSON-RPC error codes and the handler error type.

use serde_json::Value;

use crate::types::RpcErrorBody;

// ── Error code constants ────────────────────────────────────────────

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Handler failure.
pub const INTERNAL_ERROR: i64 = -32603;
/// Start of the implementation-defined server error range.
pub const SERVER_ERROR: i64 = -32000;

/// Error returned by a method handler.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RpcError {
    /// Required parameter missing or of the wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// The handler failed.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// Error with an application-chosen code.
    #[error("{message}")]
    Custom {
        /// Numeric code.
        code: i64,
        /// Human-readable message.
        message: String,
        /// Optional structured data.
        data: Option<Value>,
    },
}

impl RpcError {
    /// Shorthand for [`RpcError::InvalidParams`].
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Shorthand for [`RpcError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Numeric code for this variant.
    pub fn code(&self) -> i64 {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::Custom { code, .. } => *code,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> RpcErrorBody {
        let message = match self {
            Self::Internal { message } => format!("Internal error: {message}"),
            Self::InvalidParams { message } | Self::Custom { message, .. } => message.clone(),
        };
        RpcErrorBody {
            code: self.code(),
            message,
            data: match self {
                Self::Custom {
                    data: Some(data), ..
                } => data.clone(),
                _ => Value::Null,
            },
        }
    }
}
