//! WebSocket server endpoint: accepts any number of peers and fans sends out
//! to all of them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use figlink_core::logging::current_dispatch;
use figlink_settings::WebsocketSettings;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, debug, error, info, warn};

use crate::dispatcher::CallbackDispatcher;
use crate::endpoint::WebsocketEndpoint;
use crate::error::EndpointError;
use crate::peers::PeerSet;
use crate::service::{ServiceThread, drain_tasks};
use crate::session::{SessionContext, run_peer_session};

/// Server role of a WebSocket endpoint.
pub struct WebsocketServer {
    name: String,
    settings: WebsocketSettings,
    dispatcher: CallbackDispatcher,
    peers: Arc<PeerSet>,
    service: Mutex<Option<ServiceThread>>,
    port: AtomicU16,
    dispatch: Dispatch,
}

impl WebsocketServer {
    /// Create a stopped server with default transport settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_settings(name, WebsocketSettings::default())
    }

    /// Create a stopped server.
    ///
    /// Logs from the server's threads go to the dispatcher current on the
    /// calling thread.
    pub fn with_settings(name: impl Into<String>, settings: WebsocketSettings) -> Self {
        let name = name.into();
        Self {
            dispatcher: CallbackDispatcher::new(name.clone()),
            name,
            settings,
            peers: Arc::new(PeerSet::new()),
            service: Mutex::new(None),
            port: AtomicU16::new(0),
            dispatch: current_dispatch(),
        }
    }

    /// Bind `address:port` and start accepting peers. Returns the bound port.
    ///
    /// An empty address binds all interfaces; port `0` picks a free port.
    pub fn serve(&self, address: &str, port: u16) -> Result<u16, EndpointError> {
        let mut service = self.service.lock();
        if service.is_some() {
            return Err(EndpointError::AlreadyRunning(self.name.clone()));
        }

        let host = if address.is_empty() { "0.0.0.0" } else { address };
        let listener = std::net::TcpListener::bind((host, port)).map_err(|source| {
            EndpointError::Bind {
                address: format!("{host}:{port}"),
                source,
            }
        })?;
        listener.set_nonblocking(true)?;
        let bound = listener.local_addr()?.port();

        self.dispatcher.start(self.dispatch.clone())?;
        let ctx = Arc::new(SessionContext {
            endpoint: self.name.clone(),
            peers: Arc::clone(&self.peers),
            dispatcher: self.dispatcher.clone(),
            outbound_queue: self.settings.outbound_queue,
        });
        let grace = self.settings.shutdown_grace();
        let thread = ServiceThread::spawn(
            &format!("{}-service", self.name),
            self.dispatch.clone(),
            move |token| accept_loop(listener, ctx, token, grace),
        );
        let thread = match thread {
            Ok(thread) => thread,
            Err(err) => {
                self.dispatcher.stop();
                return Err(err.into());
            }
        };

        self.port.store(bound, Ordering::SeqCst);
        *service = Some(thread);
        info!(endpoint = %self.name, host, port = bound, "websocket server listening");
        Ok(bound)
    }

    /// Port the server is bound to, `0` before [`serve`](Self::serve).
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    /// Number of connected peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Whether any peer is connected.
    pub fn has_client(&self) -> bool {
        !self.peers.is_empty()
    }

    /// Block until no peer is connected.
    pub fn wait_until_no_client(&self) {
        self.peers.wait_until_empty();
    }

    /// Block until no peer is connected or `timeout` elapses.
    pub fn wait_until_no_client_for(&self, timeout: Duration) -> bool {
        self.peers.wait_until_empty_for(timeout)
    }
}

impl WebsocketEndpoint for WebsocketServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn dispatcher(&self) -> &CallbackDispatcher {
        &self.dispatcher
    }

    fn wait_connection(&self, timeout: Duration) -> bool {
        self.peers.wait_for_peer(timeout)
    }

    fn is_connected(&self) -> bool {
        self.has_client()
    }

    fn send(&self, message: &str) -> bool {
        self.peers.broadcast(message)
    }

    fn stop(&self) {
        let service = self.service.lock().take();
        if let Some(service) = service {
            debug!(endpoint = %self.name, "stopping websocket server");
            service.stop();
        }
        self.dispatcher.stop();
    }
}

impl Drop for WebsocketServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: std::net::TcpListener,
    ctx: Arc<SessionContext>,
    token: CancellationToken,
    grace: Duration,
) {
    let listener = match tokio::net::TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(error) => {
            error!(endpoint = %ctx.endpoint, %error, "failed to register listener");
            return;
        }
    };

    let mut sessions: Vec<tokio::task::JoinHandle<()>> = Vec::new();
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    sessions.retain(|handle| !handle.is_finished());
                    sessions.push(tokio::spawn(handshake(stream, addr, Arc::clone(&ctx), token.child_token())));
                }
                Err(error) => warn!(endpoint = %ctx.endpoint, %error, "accept failed"),
            },
        }
    }

    drain_tasks(sessions, grace).await;
    debug!(endpoint = %ctx.endpoint, "accept loop exited");
}

async fn handshake(
    stream: tokio::net::TcpStream,
    addr: SocketAddr,
    ctx: Arc<SessionContext>,
    token: CancellationToken,
) {
    if let Err(error) = stream.set_nodelay(true) {
        debug!(%addr, %error, "failed to set TCP_NODELAY");
    }
    let ws = tokio::select! {
        () = token.cancelled() => return,
        ws = tokio_tungstenite::accept_async(stream) => match ws {
            Ok(ws) => ws,
            Err(error) => {
                warn!(endpoint = %ctx.endpoint, %addr, %error, "websocket handshake failed");
                return;
            }
        },
    };
    let peer_id = format!("peer_{}", uuid::Uuid::now_v7().simple());
    debug!(endpoint = %ctx.endpoint, %addr, peer_id, "handshake complete");
    run_peer_session(ws, peer_id, ctx, token).await;
}
