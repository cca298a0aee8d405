//! The network service thread behind each endpoint.
//!
//! Each endpoint drives its sockets from one OS thread running a
//! current-thread tokio runtime. Shutdown is signalled through a
//! [`CancellationToken`] and the thread is joined on [`ServiceThread::stop`].

use std::future::Future;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use figlink_core::logging::spawn_with_dispatch;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, debug, info, warn};

/// A named thread running an async service until cancelled.
pub struct ServiceThread {
    name: String,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceThread {
    /// Build a runtime and run `service` on a new thread.
    ///
    /// The runtime is built before the thread starts, so runtime errors are
    /// reported here rather than lost on the thread.
    pub fn spawn<F, Fut>(name: &str, dispatch: Dispatch, service: F) -> std::io::Result<Self>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()>,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = spawn_with_dispatch(name, dispatch, move || {
            runtime.block_on(service(child));
        })?;
        debug!(service = name, "service thread started");

        Ok(Self {
            name: name.to_owned(),
            token,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether a stop has been requested.
    pub fn is_stopping(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the service and join its thread. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
        let handle = self.handle.lock().take();
        let Some(handle) = handle else { return };
        if handle.thread().id() == thread::current().id() {
            debug!(service = %self.name, "stop called on service thread, detaching");
            return;
        }
        if handle.join().is_err() {
            warn!(service = %self.name, "service thread panicked");
        }
    }
}

impl Drop for ServiceThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Wait up to `timeout` for connection tasks to finish, then abort the rest.
pub async fn drain_tasks(handles: Vec<tokio::task::JoinHandle<()>>, timeout: Duration) {
    if handles.is_empty() {
        return;
    }
    info!(
        task_count = handles.len(),
        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        "waiting for connection tasks to complete"
    );

    let aborts: Vec<_> = handles.iter().map(tokio::task::JoinHandle::abort_handle).collect();
    let drain = futures::future::join_all(handles);
    if tokio::time::timeout(timeout, drain).await.is_err() {
        warn!("connection drain timed out after {timeout:?}, aborting remaining tasks");
        for abort in aborts {
            abort.abort();
        }
    }
}
