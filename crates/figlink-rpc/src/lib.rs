//! # figlink-rpc
//!
//! JSON-RPC 2.0 on top of a [`figlink_ws::WebsocketEndpoint`].
//!
//! - [`JsonRpc`]: calls with per-call response correlation, notifications,
//!   and dispatch of inbound requests to registered handlers
//! - [`MethodRegistry`]: method and notification handler tables
//! - [`types`]: wire-format request, response and error objects
//! - [`errors`]: standard error codes and the handler error type

#![deny(unsafe_code)]

pub mod dispatch;
pub mod errors;
pub mod json_rpc;
pub mod pending;
pub mod registry;
pub mod types;

pub use errors::RpcError;
pub use json_rpc::{CancelHandle, JsonRpc};
pub use pending::{CallError, CallResult, PendingCall};
pub use registry::{MethodHandler, MethodRegistry, NotificationHandler};
pub use types::{JSONRPC_VERSION, RpcErrorBody, RpcRequest, RpcResponse};
