//! The endpoint contract shared by the client and server roles.

use std::time::Duration;

use crate::dispatcher::{CallbackDispatcher, MessageCallback};

/// One side of a WebSocket connection.
///
/// Implementors own a [`CallbackDispatcher`]; callback registration is
/// provided on top of it.
pub trait WebsocketEndpoint: Send + Sync {
    /// Name used in logs and thread names.
    fn name(&self) -> &str;

    /// The dispatcher that delivers inbound messages.
    fn dispatcher(&self) -> &CallbackDispatcher;

    /// Block until at least one peer is connected or `timeout` elapses.
    fn wait_connection(&self, timeout: Duration) -> bool;

    /// Whether a peer is connected right now.
    fn is_connected(&self) -> bool;

    /// Send a text message to every connected peer.
    ///
    /// Returns `false` when there is no peer or any peer could not take the
    /// message. Deliveries to other peers are not rolled back.
    fn send(&self, message: &str) -> bool;

    /// Stop background threads and clear callbacks. Idempotent.
    fn stop(&self);

    /// Register a callback invoked with every inbound message.
    fn register_callback(&self, name: &str, callback: MessageCallback) {
        self.dispatcher().register(name, callback);
    }

    /// Remove a callback. Returns whether one was registered.
    fn unregister_callback(&self, name: &str) -> bool {
        self.dispatcher().unregister(name)
    }
}
