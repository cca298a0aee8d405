//! Classification and dispatch of inbound frames.

use serde_json::{Map, Value};
use tracing::{debug, error, trace};

use crate::errors;
use crate::registry::MethodRegistry;
use crate::types::{JSONRPC_VERSION, RpcResponse};

/// Handle one inbound frame. Returns the response to send back, if any.
///
/// - unparseable JSON: `PARSE_ERROR` with a `null` id
/// - responses (no `method`, but `result` or `error`): left to pending calls
/// - bad `jsonrpc` tag or missing `method`: `INVALID_REQUEST` when an id was given
/// - no id: delivered to the notification handler, never answered
/// - otherwise: dispatched to the method handler
pub fn handle_message(message: &str, registry: &MethodRegistry) -> Option<RpcResponse> {
    let request: Value = match serde_json::from_str(message) {
        Ok(value) => value,
        Err(err) => {
            error!(error = %err, "JSON-RPC parse error");
            return Some(RpcResponse::error(
                Value::Null,
                errors::PARSE_ERROR,
                format!("Parse error: {err}"),
            ));
        }
    };

    let Some(object) = request.as_object() else {
        debug!("ignoring non-object JSON-RPC frame");
        return None;
    };

    if is_response(object) {
        trace!(id = ?object.get("id"), "response frame, leaving to pending calls");
        return None;
    }

    let id = object.get("id").cloned();
    let method = object
        .get("method")
        .and_then(Value::as_str)
        .filter(|_| object.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION));
    let Some(method) = method else {
        debug!(?id, "invalid JSON-RPC request");
        return id.map(|id| {
            RpcResponse::error(
                id,
                errors::INVALID_REQUEST,
                "Invalid JSON-RPC request format",
            )
        });
    };

    let params = object.get("params").cloned().unwrap_or(Value::Null);
    match id {
        None => {
            let _ = registry.notify(method, params);
            None
        }
        Some(id) => Some(registry.dispatch(id, method, params)),
    }
}

/// A response is a `"2.0"` frame with no method and a `result` or `error`
/// member. Versionless look-alikes are answered as invalid requests.
pub fn is_response(object: &Map<String, Value>) -> bool {
    object.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION)
        && !object.contains_key("method")
        && (object.contains_key("result") || object.contains_key("error"))
}
