//! Connected peer state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// One connected peer as seen by the server: its outbound queue plus the
/// liveness bookkeeping the heartbeat reads.
pub struct PeerConnection {
    /// Server-assigned peer id (`peer_<uuid>`).
    pub id: String,
    outbound: mpsc::Sender<Arc<String>>,
    last_seen: Mutex<Instant>,
    dropped: AtomicU64,
}

impl PeerConnection {
    /// Wrap the sending half of a session's outbound queue.
    pub fn new(id: String, outbound: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            outbound,
            last_seen: Mutex::new(Instant::now()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue a frame without waiting. `false` when the queue is full or the
    /// session is gone; the frame is then counted as dropped.
    pub fn send(&self, frame: Arc<String>) -> bool {
        let queued = self.outbound.try_send(frame).is_ok();
        if !queued {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queued
    }

    /// Frames dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Note a ping or pong from the peer.
    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Whether the peer has been silent for longer than `timeout`.
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.last_seen.lock().elapsed() > timeout
    }
}
