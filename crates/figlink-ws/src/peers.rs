//! The set of connected peers, with blocking waits on its size.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::connection::PeerConnection;

/// Connected peers keyed by connection ID.
///
/// Every insert and removal wakes waiters, so presence and absence can be
/// awaited without polling.
#[derive(Default)]
pub struct PeerSet {
    peers: Mutex<HashMap<String, Arc<PeerConnection>>>,
    changed: Condvar,
}

impl PeerSet {
    /// Create an empty peer set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer.
    pub fn insert(&self, peer: Arc<PeerConnection>) {
        let _ = self.peers.lock().insert(peer.id.clone(), peer);
        let _ = self.changed.notify_all();
    }

    /// Remove a peer by ID.
    pub fn remove(&self, id: &str) -> Option<Arc<PeerConnection>> {
        let removed = self.peers.lock().remove(id);
        let _ = self.changed.notify_all();
        removed
    }

    /// Number of connected peers.
    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    /// Whether no peer is connected.
    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Block until at least one peer is present or `timeout` elapses.
    pub fn wait_for_peer(&self, timeout: Duration) -> bool {
        let mut peers = self.peers.lock();
        let _ = self
            .changed
            .wait_while_for(&mut peers, |p| p.is_empty(), timeout);
        !peers.is_empty()
    }

    /// Block until the set is empty.
    pub fn wait_until_empty(&self) {
        let mut peers = self.peers.lock();
        self.changed.wait_while(&mut peers, |p| !p.is_empty());
    }

    /// Block until the set is empty or `timeout` elapses.
    pub fn wait_until_empty_for(&self, timeout: Duration) -> bool {
        let mut peers = self.peers.lock();
        let _ = self
            .changed
            .wait_while_for(&mut peers, |p| !p.is_empty(), timeout);
        peers.is_empty()
    }

    /// Send `message` to every peer.
    ///
    /// Returns `false` if there are no peers or any peer rejected the message.
    pub fn broadcast(&self, message: &str) -> bool {
        let targets: Vec<Arc<PeerConnection>> = self.peers.lock().values().cloned().collect();
        if targets.is_empty() {
            return false;
        }

        let message = Arc::new(message.to_owned());
        let mut delivered = true;
        for peer in targets {
            if !peer.send(Arc::clone(&message)) {
                warn!(peer_id = %peer.id, dropped = peer.dropped(), "failed to enqueue message for peer");
                delivered = false;
            }
        }
        delivered
    }
}
