//! Inbound message queue and the callback executor thread.
//!
//! The transport thread only enqueues. A dedicated executor thread pops each
//! message and invokes a snapshot of the registered callbacks, so callbacks
//! may register or unregister callbacks (including themselves) without
//! deadlocking, and a slow callback never stalls network I/O.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use figlink_core::logging::spawn_with_dispatch;
use figlink_core::panic_message;
use parking_lot::{Condvar, Mutex};
use tracing::{Dispatch, debug, error, trace, warn};

/// A named message callback. Receives every inbound text message.
pub type MessageCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Queue {
    messages: VecDeque<String>,
    running: bool,
}

struct Shared {
    endpoint: String,
    queue: Mutex<Queue>,
    ready: Condvar,
    callbacks: Mutex<HashMap<String, MessageCallback>>,
    executor: Mutex<Option<JoinHandle<()>>>,
}

/// Callback registry plus the single-consumer queue that feeds it.
///
/// Cloning yields another handle to the same registry and queue.
#[derive(Clone)]
pub struct CallbackDispatcher {
    shared: Arc<Shared>,
}

impl CallbackDispatcher {
    /// Create a stopped dispatcher for the named endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                endpoint: endpoint.into(),
                queue: Mutex::new(Queue::default()),
                ready: Condvar::new(),
                callbacks: Mutex::new(HashMap::new()),
                executor: Mutex::new(None),
            }),
        }
    }

    /// Start the executor thread. No-op if it is already running.
    pub fn start(&self, dispatch: Dispatch) -> std::io::Result<()> {
        let mut executor = self.shared.executor.lock();
        if executor.is_some() {
            return Ok(());
        }
        self.shared.queue.lock().running = true;

        let shared = Arc::clone(&self.shared);
        let name = format!("{}-callbacks", self.shared.endpoint);
        match spawn_with_dispatch(name, dispatch, move || run_executor(&shared)) {
            Ok(handle) => {
                *executor = Some(handle);
                Ok(())
            }
            Err(error) => {
                self.shared.queue.lock().running = false;
                Err(error)
            }
        }
    }

    /// Whether the executor thread is accepting messages.
    pub fn is_running(&self) -> bool {
        self.shared.queue.lock().running
    }

    /// Queue an inbound message for delivery. Dropped if the executor is stopped.
    pub fn push(&self, message: String) {
        let mut queue = self.shared.queue.lock();
        if !queue.running {
            trace!(endpoint = %self.shared.endpoint, "dispatcher stopped, dropping message");
            return;
        }
        queue.messages.push_back(message);
        drop(queue);
        let _ = self.shared.ready.notify_one();
    }

    /// Register a callback under `name`, replacing any previous one.
    pub fn register(&self, name: &str, callback: MessageCallback) {
        if self
            .shared
            .callbacks
            .lock()
            .insert(name.to_owned(), callback)
            .is_some()
        {
            debug!(endpoint = %self.shared.endpoint, callback = name, "replaced callback");
        }
    }

    /// Remove the callback registered under `name`. Returns whether one existed.
    pub fn unregister(&self, name: &str) -> bool {
        self.shared.callbacks.lock().remove(name).is_some()
    }

    /// Whether a callback is registered under `name`.
    pub fn has_callback(&self, name: &str) -> bool {
        self.shared.callbacks.lock().contains_key(name)
    }

    /// Number of registered callbacks.
    pub fn callback_count(&self) -> usize {
        self.shared.callbacks.lock().len()
    }

    /// Stop the executor, discard queued messages and clear all callbacks.
    ///
    /// Idempotent. Safe to call from inside a callback; the executor then
    /// exits after the current message instead of being joined.
    pub fn stop(&self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.running = false;
            queue.messages.clear();
        }
        let _ = self.shared.ready.notify_all();

        let handle = self.shared.executor.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                trace!(endpoint = %self.shared.endpoint, "stop called from executor, detaching");
            } else if handle.join().is_err() {
                warn!(endpoint = %self.shared.endpoint, "callback executor panicked");
            }
        }
        self.shared.callbacks.lock().clear();
    }
}

fn run_executor(shared: &Shared) {
    debug!(endpoint = %shared.endpoint, "callback executor started");
    loop {
        let message = {
            let mut queue = shared.queue.lock();
            while queue.running && queue.messages.is_empty() {
                shared.ready.wait(&mut queue);
            }
            if !queue.running {
                break;
            }
            queue.messages.pop_front()
        };
        let Some(message) = message else { continue };

        let snapshot: Vec<(String, MessageCallback)> = shared
            .callbacks
            .lock()
            .iter()
            .map(|(name, callback)| (name.clone(), Arc::clone(callback)))
            .collect();

        for (name, callback) in snapshot {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(&message))) {
                error!(
                    endpoint = %shared.endpoint,
                    callback = %name,
                    panic = %panic_message(payload.as_ref()),
                    "message callback panicked"
                );
            }
        }
    }
    debug!(endpoint = %shared.endpoint, "callback executor stopped");
}
