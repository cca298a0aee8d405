//! Method and notification handler registries.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use figlink_core::panic_message;
use metrics::{counter, histogram};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::errors::{self, RpcError};
use crate::types::RpcResponse;

/// Handlers slower than this are logged.
const SLOW_HANDLER: Duration = Duration::from_secs(1);

/// Trait implemented by every method handler.
///
/// Closures of the form `Fn(Value) -> Result<Value, RpcError>` implement it.
pub trait MethodHandler: Send + Sync {
    /// Execute the handler with the request's params.
    fn handle(&self, params: Value) -> Result<Value, RpcError>;
}

impl<F> MethodHandler for F
where
    F: Fn(Value) -> Result<Value, RpcError> + Send + Sync,
{
    fn handle(&self, params: Value) -> Result<Value, RpcError> {
        self(params)
    }
}

/// Handler for an inbound notification.
pub type NotificationHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Registry mapping method names to handlers.
///
/// Handlers are invoked without any registry lock held, so a handler may
/// register or unregister other handlers.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn MethodHandler>>>,
    notifications: RwLock<HashMap<String, NotificationHandler>>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method name, replacing any previous one.
    pub fn register(&self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self
            .handlers
            .write()
            .insert(method.to_owned(), Arc::new(handler));
    }

    /// Remove a method handler. Returns whether one existed.
    pub fn unregister(&self, method: &str) -> bool {
        self.handlers.write().remove(method).is_some()
    }

    /// Register a notification handler, replacing any previous one.
    pub fn register_notification(&self, method: &str, handler: NotificationHandler) {
        let _ = self
            .notifications
            .write()
            .insert(method.to_owned(), handler);
        debug!(method, "registered notification handler");
    }

    /// Remove a notification handler. Returns whether one existed.
    pub fn unregister_notification(&self, method: &str) -> bool {
        self.notifications.write().remove(method).is_some()
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.read().contains_key(method)
    }

    /// Check whether a notification handler is registered.
    pub fn has_notification(&self, method: &str) -> bool {
        self.notifications.read().contains_key(method)
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered notification handlers.
    pub fn notification_count(&self) -> usize {
        self.notifications.read().len()
    }

    /// Run the handler for `method` and build the response for `id`.
    pub fn dispatch(&self, id: Value, method: &str, params: Value) -> RpcResponse {
        counter!("rpc_requests_total", "method" => method.to_owned()).increment(1);

        let handler = self.handlers.read().get(method).cloned();
        let Some(handler) = handler else {
            counter!("rpc_errors_total", "method" => method.to_owned(), "error_type" => "method_not_found").increment(1);
            return RpcResponse::error(
                id,
                errors::METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            );
        };

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(params)))
            .unwrap_or_else(|payload| Err(RpcError::internal(panic_message(payload.as_ref()))));

        let response = match outcome {
            Ok(result) => RpcResponse::success(id, result),
            Err(err) => {
                error!(method, error = %err, "handler failed");
                counter!("rpc_errors_total", "method" => method.to_owned(), "error_type" => err.code().to_string()).increment(1);
                RpcResponse::from_error_body(id, err.to_error_body())
            }
        };

        let duration = start.elapsed();
        histogram!("rpc_request_duration_seconds", "method" => method.to_owned())
            .record(duration.as_secs_f64());
        if duration >= SLOW_HANDLER {
            warn!(
                method,
                duration_secs = duration.as_secs_f64(),
                "slow RPC handler"
            );
        }

        response
    }

    /// Deliver a notification. Returns whether a handler was registered.
    pub fn notify(&self, method: &str, params: Value) -> bool {
        let handler = self.notifications.read().get(method).cloned();
        let Some(handler) = handler else {
            trace!(method, "no handler for notification");
            return false;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
            error!(
                method,
                panic = %panic_message(payload.as_ref()),
                "notification handler panicked"
            );
        }
        true
    }
}
