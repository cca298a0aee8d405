//! Outcome slots for outstanding calls.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde_json::Value;

use crate::types::RpcErrorBody;

/// Why a call produced no result.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CallError {
    /// The peer answered with an error object.
    #[error("remote error {}: {}", .0.code, .0.message)]
    Remote(RpcErrorBody),
    /// The call was cancelled before a response arrived.
    #[error("call cancelled")]
    Cancelled,
}

/// Outcome of a call.
pub type CallResult = Result<Value, CallError>;

/// A set-once outcome with a blocking wait.
#[derive(Default)]
pub(crate) struct CallSlot {
    outcome: Mutex<Option<CallResult>>,
    ready: Condvar,
}

impl CallSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store the outcome. Returns `false` if one was already stored.
    pub(crate) fn fulfill(&self, outcome: CallResult) -> bool {
        let mut slot = self.outcome.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        drop(slot);
        let _ = self.ready.notify_all();
        true
    }

    fn is_ready(&self) -> bool {
        self.outcome.lock().is_some()
    }

    fn wait(&self) -> CallResult {
        let mut slot = self.outcome.lock();
        self.ready.wait_while(&mut slot, |o| o.is_none());
        slot.clone().unwrap_or(Err(CallError::Cancelled))
    }

    fn wait_for(&self, timeout: Duration) -> Option<CallResult> {
        let mut slot = self.outcome.lock();
        let _ = self.ready.wait_while_for(&mut slot, |o| o.is_none(), timeout);
        slot.clone()
    }
}

/// The result side of an outstanding call.
///
/// There is no built-in timeout; use [`wait_timeout`](Self::wait_timeout)
/// and cancel through the paired [`CancelHandle`](crate::CancelHandle).
pub struct PendingCall {
    id: u64,
    method: String,
    slot: Arc<CallSlot>,
}

impl PendingCall {
    pub(crate) fn new(id: u64, method: String, slot: Arc<CallSlot>) -> Self {
        Self { id, method, slot }
    }

    /// Request id on the wire.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Method this call invoked.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Whether the outcome is available.
    pub fn is_ready(&self) -> bool {
        self.slot.is_ready()
    }

    /// Block until the call is answered or cancelled.
    pub fn wait(&self) -> CallResult {
        self.slot.wait()
    }

    /// Block up to `timeout`. `None` if the call is still outstanding.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CallResult> {
        self.slot.wait_for(timeout)
    }
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("ready", &self.is_ready())
            .finish()
    }
}
