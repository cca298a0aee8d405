//! A JSON-RPC 2.0 session bound to one WebSocket endpoint.
//!
//! Each call registers a uniquely named one-shot callback on the endpoint
//! before its request is sent. The callback inspects every inbound frame,
//! resolves its [`PendingCall`] when it sees the response carrying its id, and
//! removes itself. Inbound requests and notifications go through a single
//! dispatch callback into the [`MethodRegistry`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use figlink_core::CallbackName;
use figlink_ws::WebsocketEndpoint;
use metrics::counter;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::dispatch::{handle_message, is_response};
use crate::pending::{CallError, CallResult, CallSlot, PendingCall};
use crate::registry::{MethodHandler, MethodRegistry, NotificationHandler};
use crate::types::{RpcErrorBody, RpcRequest};

/// Name of the endpoint callback feeding inbound requests to the registry.
const DISPATCH_CALLBACK: &str = "jsonrpc_handler";

struct Inner {
    endpoint: Arc<dyn WebsocketEndpoint>,
    registry: MethodRegistry,
    next_id: AtomicU64,
    pending: Mutex<HashMap<CallbackName, Arc<CallSlot>>>,
}

impl Inner {
    fn handle_incoming(&self, message: &str) {
        let Some(response) = handle_message(message, &self.registry) else {
            return;
        };
        match serde_json::to_string(&response) {
            Ok(text) => {
                if !self.endpoint.send(&text) {
                    debug!(endpoint = self.endpoint.name(), id = %response.id, "failed to send response");
                }
            }
            Err(error) => warn!(%error, "failed to serialize response"),
        }
    }

    /// Forget a call and remove its endpoint callback.
    fn release(&self, name: &CallbackName) {
        let _ = self.pending.lock().remove(name);
        let _ = self.endpoint.unregister_callback(name.as_str());
    }

    fn shutdown(&self) {
        self.endpoint.stop();
        let pending: Vec<Arc<CallSlot>> = self.pending.lock().drain().map(|(_, slot)| slot).collect();
        if !pending.is_empty() {
            debug!(count = pending.len(), "cancelling outstanding calls");
        }
        for slot in pending {
            let _ = slot.fulfill(Err(CallError::Cancelled));
        }
    }
}

/// JSON-RPC session over a WebSocket endpoint.
///
/// Owns the endpoint's lifecycle: dropping the session stops the endpoint and
/// cancels every outstanding call.
pub struct JsonRpc {
    inner: Arc<Inner>,
}

impl JsonRpc {
    /// Bind a session to `endpoint`.
    pub fn new<E>(endpoint: Arc<E>) -> Self
    where
        E: WebsocketEndpoint + 'static,
    {
        let inner = Arc::new(Inner {
            endpoint,
            registry: MethodRegistry::new(),
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.endpoint.register_callback(
            DISPATCH_CALLBACK,
            Arc::new(move |message: &str| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_incoming(message);
                }
            }),
        );
        Self { inner }
    }

    /// The endpoint this session talks through.
    pub fn endpoint(&self) -> &Arc<dyn WebsocketEndpoint> {
        &self.inner.endpoint
    }

    /// Register a method handler.
    pub fn register_handler(&self, method: &str, handler: impl MethodHandler + 'static) {
        self.inner.registry.register(method, handler);
    }

    /// Remove a method handler.
    pub fn unregister_handler(&self, method: &str) -> bool {
        self.inner.registry.unregister(method)
    }

    /// Register a notification handler.
    pub fn register_notification(&self, method: &str, handler: NotificationHandler) {
        self.inner.registry.register_notification(method, handler);
    }

    /// Remove a notification handler.
    pub fn unregister_notification(&self, method: &str) -> bool {
        self.inner.registry.unregister_notification(method)
    }

    /// Whether a notification handler is registered for `method`.
    pub fn has_notification(&self, method: &str) -> bool {
        self.inner.registry.has_notification(method)
    }

    /// Number of calls still awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Call a remote method.
    ///
    /// The response callback is registered before the request is sent. A
    /// failed send is only logged; the call then stays pending until
    /// cancelled.
    pub fn call(&self, method: &str, params: Value) -> (PendingCall, CancelHandle) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let name = CallbackName::new();
        let slot = Arc::new(CallSlot::new());
        let _ = self
            .inner
            .pending
            .lock()
            .insert(name.clone(), Arc::clone(&slot));

        let weak = Arc::downgrade(&self.inner);
        let callback_slot = Arc::clone(&slot);
        let callback_name = name.clone();
        let method_name = method.to_owned();
        self.inner.endpoint.register_callback(
            name.as_str(),
            Arc::new(move |message: &str| {
                let Some(outcome) = match_response(message, id) else {
                    return;
                };
                debug!(method = %method_name, id, ok = outcome.is_ok(), "received response");
                let _ = callback_slot.fulfill(outcome);
                if let Some(inner) = weak.upgrade() {
                    inner.release(&callback_name);
                }
            }),
        );

        counter!("rpc_calls_total", "method" => method.to_owned()).increment(1);
        let request = RpcRequest::call(method, params, id);
        match serde_json::to_string(&request) {
            Ok(text) => {
                if self.inner.endpoint.send(&text) {
                    debug!(method, id, "called remote method");
                } else {
                    debug!(method, id, "request not delivered");
                }
            }
            Err(error) => warn!(method, id, %error, "failed to serialize request"),
        }

        let cancel = CancelHandle {
            id,
            name,
            slot: Arc::clone(&slot),
            inner: Arc::downgrade(&self.inner),
        };
        (PendingCall::new(id, method.to_owned(), slot), cancel)
    }

    /// Send a notification. Returns whether the endpoint accepted it.
    pub fn notify(&self, method: &str, params: Value) -> bool {
        let request = RpcRequest::notification(method, params);
        match serde_json::to_string(&request) {
            Ok(text) => self.inner.endpoint.send(&text),
            Err(error) => {
                warn!(method, %error, "failed to serialize notification");
                false
            }
        }
    }
}

impl Drop for JsonRpc {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

/// Cancels one outstanding call.
#[derive(Clone)]
pub struct CancelHandle {
    id: u64,
    name: CallbackName,
    slot: Arc<CallSlot>,
    inner: Weak<Inner>,
}

impl CancelHandle {
    /// Request id of the call.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resolve the call as cancelled and drop its response callback.
    ///
    /// No effect on a call that already completed, other than the cleanup.
    pub fn cancel(&self) {
        if self.slot.fulfill(Err(CallError::Cancelled)) {
            trace!(id = self.id, "call cancelled");
            counter!("rpc_calls_cancelled_total").increment(1);
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.release(&self.name);
        }
    }
}

/// Match a frame against the response for request `id`.
fn match_response(message: &str, id: u64) -> Option<CallResult> {
    let value: Value = serde_json::from_str(message).ok()?;
    let object = value.as_object()?;
    if !is_response(object) || object.get("id").and_then(Value::as_u64) != Some(id) {
        return None;
    }
    if let Some(error) = object.get("error") {
        let body = serde_json::from_value::<RpcErrorBody>(error.clone()).unwrap_or_else(|_| {
            RpcErrorBody {
                code: crate::errors::INTERNAL_ERROR,
                message: error.to_string(),
                data: Value::Null,
            }
        });
        return Some(Err(CallError::Remote(body)));
    }
    Some(Ok(object.get("result").cloned().unwrap_or(Value::Null)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{self, RpcError};
    use figlink_ws::memory::MemoryEndpoint;
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn session() -> (JsonRpc, Arc<MemoryEndpoint>) {
        let endpoint = Arc::new(MemoryEndpoint::new("rpc-test").unwrap());
        (JsonRpc::new(Arc::clone(&endpoint)), endpoint)
    }

    fn sent_json(endpoint: &MemoryEndpoint) -> Vec<Value> {
        endpoint
            .sent()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    // ── call ────────────────────────────────────────────────────────

    #[test]
    fn call_sends_request_and_resolves_on_response() {
        let (rpc, endpoint) = session();
        let (pending, _cancel) = rpc.call("Plotly.newPlot", json!({"data": [1]}));

        let sent = sent_json(&endpoint);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["jsonrpc"], "2.0");
        assert_eq!(sent[0]["method"], "Plotly.newPlot");
        assert_eq!(sent[0]["params"], json!({"data": [1]}));
        assert_eq!(sent[0]["id"], json!(pending.id()));

        endpoint.inject(
            json!({"jsonrpc": "2.0", "id": pending.id(), "result": {"ok": true}}).to_string(),
        );
        assert_eq!(pending.wait_timeout(WAIT), Some(Ok(json!({"ok": true}))));
        assert!(endpoint.wait_for_sent(1, WAIT));
        assert_eq!(rpc.pending_calls(), 0);
    }

    #[test]
    fn ids_are_unique_per_session() {
        let (rpc, _endpoint) = session();
        let ids: Vec<u64> = (0..5).map(|_| rpc.call("m", Value::Null).0.id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let (other, _endpoint) = session();
        assert_eq!(other.call("m", Value::Null).0.id(), 1);
    }

    #[test]
    fn response_for_other_id_is_ignored() {
        let (rpc, endpoint) = session();
        let (pending, _cancel) = rpc.call("m", Value::Null);
        endpoint.inject(json!({"jsonrpc": "2.0", "id": 999, "result": 1}).to_string());
        assert!(pending.wait_timeout(Duration::from_millis(100)).is_none());
        assert_eq!(rpc.pending_calls(), 1);
    }

    #[test]
    fn versionless_response_does_not_resolve_call() {
        let (rpc, endpoint) = session();
        let (pending, _cancel) = rpc.call("m", Value::Null);
        endpoint.inject(json!({"id": pending.id(), "result": 1}).to_string());

        assert!(endpoint.wait_for_sent(2, WAIT));
        let rejected = &sent_json(&endpoint)[1];
        assert_eq!(rejected["id"], json!(pending.id()));
        assert_eq!(rejected["error"]["code"], errors::INVALID_REQUEST);
        assert!(pending.wait_timeout(Duration::from_millis(100)).is_none());
        assert_eq!(rpc.pending_calls(), 1);
    }

    #[test]
    fn remote_error_resolves_call() {
        let (rpc, endpoint) = session();
        let (pending, _cancel) = rpc.call("nope", Value::Null);
        endpoint.inject(
            json!({
                "jsonrpc": "2.0",
                "id": pending.id(),
                "error": {"code": -32601, "message": "Method not found: nope", "data": null}
            })
            .to_string(),
        );
        match pending.wait_timeout(WAIT) {
            Some(Err(CallError::Remote(body))) => assert_eq!(body.code, errors::METHOD_NOT_FOUND),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn null_result_resolves_to_null() {
        let (rpc, endpoint) = session();
        let (pending, _cancel) = rpc.call("Plotly.redraw", json!({}));
        endpoint.inject(json!({"jsonrpc": "2.0", "id": pending.id(), "result": null}).to_string());
        assert_eq!(pending.wait_timeout(WAIT), Some(Ok(Value::Null)));
    }

    #[test]
    fn cancel_resolves_and_unregisters() {
        let (rpc, endpoint) = session();
        let (pending, cancel) = rpc.call("slow", Value::Null);
        assert_eq!(rpc.pending_calls(), 1);
        assert_eq!(endpoint.dispatcher().callback_count(), 2);

        cancel.cancel();
        assert_eq!(pending.wait_timeout(WAIT), Some(Err(CallError::Cancelled)));
        assert_eq!(rpc.pending_calls(), 0);
        assert_eq!(endpoint.dispatcher().callback_count(), 1);

        // A late response is ignored.
        endpoint.inject(json!({"jsonrpc": "2.0", "id": pending.id(), "result": 1}).to_string());
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(pending.wait(), Err(CallError::Cancelled));
        cancel.cancel();
    }

    #[test]
    fn call_without_peer_stays_pending() {
        let (rpc, endpoint) = session();
        endpoint.set_connected(false);
        let (pending, cancel) = rpc.call("m", Value::Null);
        assert!(pending.wait_timeout(Duration::from_millis(50)).is_none());
        cancel.cancel();
        assert!(endpoint.sent().is_empty());
    }

    #[test]
    fn drop_cancels_pending_calls_and_stops_endpoint() {
        let (rpc, endpoint) = session();
        let (pending, cancel) = rpc.call("m", Value::Null);
        drop(rpc);
        assert_eq!(pending.wait_timeout(WAIT), Some(Err(CallError::Cancelled)));
        assert!(!endpoint.is_connected());
        assert_eq!(endpoint.dispatcher().callback_count(), 0);
        cancel.cancel();
    }

    // ── notify ──────────────────────────────────────────────────────

    #[test]
    fn notify_has_no_id() {
        let (rpc, endpoint) = session();
        assert!(rpc.notify("plotly_click", json!({"points": []})));
        let sent = sent_json(&endpoint);
        assert!(sent[0].get("id").is_none());
        assert_eq!(sent[0]["method"], "plotly_click");
    }

    #[test]
    fn notify_without_peer_fails() {
        let (rpc, endpoint) = session();
        endpoint.set_connected(false);
        assert!(!rpc.notify("x", Value::Null));
    }

    // ── inbound dispatch ────────────────────────────────────────────

    #[test]
    fn inbound_call_gets_response() {
        let (rpc, endpoint) = session();
        rpc.register_handler("sum", |params: Value| -> Result<Value, RpcError> {
            let values = params
                .as_array()
                .ok_or_else(|| RpcError::invalid_params("expected an array"))?;
            Ok(json!(values.iter().filter_map(Value::as_i64).sum::<i64>()))
        });

        endpoint.inject(r#"{"jsonrpc":"2.0","method":"sum","params":[1,2,3],"id":11}"#);
        assert!(endpoint.wait_for_sent(1, WAIT));
        assert_eq!(
            sent_json(&endpoint)[0],
            json!({"jsonrpc": "2.0", "id": 11, "result": 6})
        );
    }

    #[test]
    fn throwing_handler_yields_internal_error() {
        let (rpc, endpoint) = session();
        rpc.register_handler("boom", |_params: Value| -> Result<Value, RpcError> {
            Err(RpcError::internal("exploded"))
        });
        endpoint.inject(r#"{"jsonrpc":"2.0","method":"boom","id":1}"#);
        assert!(endpoint.wait_for_sent(1, WAIT));
        let response = &sent_json(&endpoint)[0];
        assert_eq!(response["error"]["code"], errors::INTERNAL_ERROR);
        assert_eq!(response["error"]["message"], "Internal error: exploded");
    }

    #[test]
    fn unregistered_handler_becomes_method_not_found() {
        let (rpc, endpoint) = session();
        rpc.register_handler("gone", |_params: Value| -> Result<Value, RpcError> { Ok(Value::Null) });
        assert!(rpc.unregister_handler("gone"));
        endpoint.inject(r#"{"jsonrpc":"2.0","method":"gone","id":2}"#);
        assert!(endpoint.wait_for_sent(1, WAIT));
        assert_eq!(sent_json(&endpoint)[0]["error"]["code"], errors::METHOD_NOT_FOUND);
    }

    #[test]
    fn unknown_notification_produces_no_frame() {
        let (_rpc, endpoint) = session();
        endpoint.inject(r#"{"jsonrpc":"2.0","method":"nobody_listens"}"#);
        assert!(!endpoint.wait_for_sent(1, Duration::from_millis(100)));
    }

    #[test]
    fn notification_handler_receives_params() {
        let (rpc, endpoint) = session();
        let (tx, rx) = std::sync::mpsc::channel();
        rpc.register_notification(
            "evt",
            Arc::new(move |params: Value| {
                let _ = tx.send(params);
            }),
        );
        endpoint.inject(r#"{"jsonrpc":"2.0","method":"evt","params":{"x":[1]}}"#);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), json!({"x": [1]}));

        assert!(rpc.unregister_notification("evt"));
        assert!(!rpc.has_notification("evt"));
    }

    #[test]
    fn responses_to_our_calls_are_not_bounced_back() {
        let (rpc, endpoint) = session();
        let (pending, _cancel) = rpc.call("m", Value::Null);
        let _ = endpoint.take_sent();
        endpoint.inject(json!({"jsonrpc": "2.0", "id": pending.id(), "result": 1}).to_string());
        assert_eq!(pending.wait_timeout(WAIT), Some(Ok(json!(1))));
        assert!(!endpoint.wait_for_sent(1, Duration::from_millis(100)));
    }

    #[test]
    fn parse_error_is_reported_to_peer() {
        let (_rpc, endpoint) = session();
        endpoint.inject("this is not json");
        assert!(endpoint.wait_for_sent(1, WAIT));
        let response = &sent_json(&endpoint)[0];
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], errors::PARSE_ERROR);
    }

    #[test]
    fn session_can_move_between_owners() {
        let (rpc, endpoint) = session();
        let moved = Box::new(rpc);
        moved.register_handler("ping", |_params: Value| -> Result<Value, RpcError> { Ok(json!("pong")) });
        endpoint.inject(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#);
        assert!(endpoint.wait_for_sent(1, WAIT));
        assert_eq!(sent_json(&endpoint)[0]["result"], "pong");
        assert_eq!(endpoint.dispatcher().callback_count(), 1);
    }

    // ── concurrency ─────────────────────────────────────────────────

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn responses_pair_with_their_calls_in_any_order(
            order in Just((0..12_usize).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let (rpc, endpoint) = session();
            let calls: Vec<_> = (0..12)
                .map(|i| rpc.call("echo", json!({"n": i})))
                .collect();
            prop_assert!(endpoint.wait_for_sent(12, WAIT));

            let requests = sent_json(&endpoint);
            for index in order {
                let request = &requests[index];
                endpoint.inject(
                    json!({"jsonrpc": "2.0", "id": request["id"], "result": request["params"]})
                        .to_string(),
                );
            }

            for (i, (pending, _cancel)) in calls.iter().enumerate() {
                prop_assert_eq!(pending.wait_timeout(WAIT), Some(Ok(json!({"n": i}))));
            }
            prop_assert_eq!(rpc.pending_calls(), 0);
        }
    }

    #[test]
    fn concurrent_callers_do_not_interfere() {
        let (rpc, endpoint) = session();
        let rpc = Arc::new(rpc);
        let responder = {
            let endpoint = Arc::clone(&endpoint);
            std::thread::spawn(move || {
                let mut answered = 0;
                while answered < 40 {
                    if !endpoint.wait_for_sent(1, WAIT) {
                        break;
                    }
                    for frame in endpoint.take_sent() {
                        let request: Value = serde_json::from_str(&frame).unwrap();
                        endpoint.inject(
                            json!({"jsonrpc": "2.0", "id": request["id"], "result": request["params"]})
                                .to_string(),
                        );
                        answered += 1;
                    }
                }
            })
        };

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let rpc = Arc::clone(&rpc);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let params = json!({"worker": worker, "i": i});
                        let (pending, _cancel) = rpc.call("echo", params.clone());
                        assert_eq!(pending.wait_timeout(WAIT), Some(Ok(params)));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        responder.join().unwrap();
    }
}
