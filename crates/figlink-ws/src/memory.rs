//! In-process endpoint for exercising the layers above the transport.
//!
//! Frames passed to [`send`](WebsocketEndpoint::send) are recorded instead of
//! written to a socket, and [`MemoryEndpoint::inject`] feeds frames to the
//! callbacks as if a peer had sent them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use figlink_core::logging::current_dispatch;
use parking_lot::{Condvar, Mutex};

use crate::dispatcher::CallbackDispatcher;
use crate::endpoint::WebsocketEndpoint;

/// A loopback endpoint with a scriptable peer.
pub struct MemoryEndpoint {
    name: String,
    dispatcher: CallbackDispatcher,
    connected: Mutex<bool>,
    connected_changed: Condvar,
    sent: Mutex<Vec<String>>,
    sent_changed: Condvar,
    reject_sends: AtomicBool,
}

impl MemoryEndpoint {
    /// Create a connected endpoint with a running callback executor.
    pub fn new(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let dispatcher = CallbackDispatcher::new(name.clone());
        dispatcher.start(current_dispatch())?;
        Ok(Self {
            name,
            dispatcher,
            connected: Mutex::new(true),
            connected_changed: Condvar::new(),
            sent: Mutex::new(Vec::new()),
            sent_changed: Condvar::new(),
            reject_sends: AtomicBool::new(false),
        })
    }

    /// Simulate the peer connecting or leaving.
    pub fn set_connected(&self, connected: bool) {
        *self.connected.lock() = connected;
        let _ = self.connected_changed.notify_all();
    }

    /// Make subsequent sends fail as if the socket write failed.
    pub fn reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::SeqCst);
    }

    /// Deliver `message` to the registered callbacks.
    pub fn inject(&self, message: impl Into<String>) {
        self.dispatcher.push(message.into());
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Drain the recorded frames.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Block until at least `count` frames have been recorded.
    pub fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let mut sent = self.sent.lock();
        let _ = self
            .sent_changed
            .wait_while_for(&mut sent, |s| s.len() < count, timeout);
        sent.len() >= count
    }
}

impl WebsocketEndpoint for MemoryEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn dispatcher(&self) -> &CallbackDispatcher {
        &self.dispatcher
    }

    fn wait_connection(&self, timeout: Duration) -> bool {
        let mut connected = self.connected.lock();
        let _ = self
            .connected_changed
            .wait_while_for(&mut connected, |c| !*c, timeout);
        *connected
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    fn send(&self, message: &str) -> bool {
        if !self.is_connected() || self.reject_sends.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().push(message.to_owned());
        let _ = self.sent_changed.notify_all();
        true
    }

    fn stop(&self) {
        self.dispatcher.stop();
        self.set_connected(false);
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;

    #[test]
    fn records_sends_while_connected() {
        let endpoint = MemoryEndpoint::new("mem").unwrap();
        assert!(endpoint.send("a"));
        endpoint.set_connected(false);
        assert!(!endpoint.send("b"));
        assert_eq!(endpoint.sent(), vec!["a".to_owned()]);
    }

    #[test]
    fn rejected_sends_report_false() {
        let endpoint = MemoryEndpoint::new("mem").unwrap();
        endpoint.reject_sends(true);
        assert!(!endpoint.send("x"));
        assert!(endpoint.take_sent().is_empty());
    }

    #[test]
    fn inject_reaches_callbacks() {
        let endpoint = MemoryEndpoint::new("mem").unwrap();
        let (tx, rx) = mpsc::channel();
        endpoint.register_callback(
            "inbox",
            Arc::new(move |m: &str| {
                let _ = tx.send(m.to_owned());
            }),
        );
        endpoint.inject("ping");
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "ping");
    }

    #[test]
    fn wait_connection_follows_state() {
        let endpoint = MemoryEndpoint::new("mem").unwrap();
        endpoint.set_connected(false);
        assert!(!endpoint.wait_connection(Duration::from_millis(20)));
        endpoint.set_connected(true);
        assert!(endpoint.wait_connection(Duration::from_millis(20)));
    }
}
