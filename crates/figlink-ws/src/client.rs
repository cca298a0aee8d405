//! WebSocket client endpoint: one outbound connection, no reconnect.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use figlink_core::logging::current_dispatch;
use figlink_settings::WebsocketSettings;
use parking_lot::Mutex;
use tracing::{Dispatch, debug, info};

use crate::dispatcher::CallbackDispatcher;
use crate::endpoint::WebsocketEndpoint;
use crate::error::EndpointError;
use crate::peers::PeerSet;
use crate::service::ServiceThread;
use crate::session::{SessionContext, run_peer_session};

/// Client role of a WebSocket endpoint.
pub struct WebsocketClient {
    name: String,
    settings: WebsocketSettings,
    dispatcher: CallbackDispatcher,
    peers: Arc<PeerSet>,
    service: Mutex<Option<ServiceThread>>,
    dispatch: Dispatch,
}

impl WebsocketClient {
    /// Create a disconnected client with default transport settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_settings(name, WebsocketSettings::default())
    }

    /// Create a disconnected client.
    pub fn with_settings(name: impl Into<String>, settings: WebsocketSettings) -> Self {
        let name = name.into();
        Self {
            dispatcher: CallbackDispatcher::new(name.clone()),
            name,
            settings,
            peers: Arc::new(PeerSet::new()),
            service: Mutex::new(None),
            dispatch: current_dispatch(),
        }
    }

    /// Connect to `uri` and start the endpoint threads.
    ///
    /// Blocks until the handshake completes or fails; an unreachable server
    /// is reported here as an error.
    pub fn connect(&self, uri: &str) -> Result<(), EndpointError> {
        let mut service = self.service.lock();
        if service.is_some() {
            return Err(EndpointError::AlreadyRunning(self.name.clone()));
        }

        self.dispatcher.start(self.dispatch.clone())?;
        let ctx = Arc::new(SessionContext {
            endpoint: self.name.clone(),
            peers: Arc::clone(&self.peers),
            dispatcher: self.dispatcher.clone(),
            outbound_queue: self.settings.outbound_queue,
        });
        let timeout = self.settings.connect_timeout();
        let target = uri.to_owned();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), EndpointError>>(1);

        let spawned = ServiceThread::spawn(
            &format!("{}-service", self.name),
            self.dispatch.clone(),
            move |token| async move {
                let connecting =
                    tokio::time::timeout(timeout, tokio_tungstenite::connect_async(target.clone()));
                let outcome = tokio::select! {
                    () = token.cancelled() => return,
                    outcome = connecting => outcome,
                };
                let ws = match outcome {
                    Ok(Ok((ws, _response))) => ws,
                    Ok(Err(error)) => {
                        let _ = ready_tx.send(Err(EndpointError::Connect {
                            uri: target,
                            reason: error.to_string(),
                        }));
                        return;
                    }
                    Err(_) => {
                        let _ = ready_tx.send(Err(EndpointError::ConnectTimeout { uri: target, timeout }));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                run_peer_session(ws, "server".to_owned(), ctx, token).await;
            },
        );
        let thread = match spawned {
            Ok(thread) => thread,
            Err(error) => {
                self.dispatcher.stop();
                return Err(error.into());
            }
        };

        let outcome = ready_rx.recv().unwrap_or_else(|_| {
            Err(EndpointError::Connect {
                uri: uri.to_owned(),
                reason: "service thread exited".to_owned(),
            })
        });
        if let Err(error) = outcome {
            thread.stop();
            self.dispatcher.stop();
            debug!(endpoint = %self.name, %error, "connect failed");
            return Err(error);
        }

        // The session registers its peer right after the handshake.
        if !self.peers.wait_for_peer(timeout) {
            thread.stop();
            self.dispatcher.stop();
            return Err(EndpointError::Connect {
                uri: uri.to_owned(),
                reason: "connection closed during setup".to_owned(),
            });
        }

        *service = Some(thread);
        info!(endpoint = %self.name, uri, "websocket client connected");
        Ok(())
    }
}

impl WebsocketEndpoint for WebsocketClient {
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
        !self.peers.is_empty()
    }

    fn send(&self, message: &str) -> bool {
        self.peers.broadcast(message)
    }

    fn stop(&self) {
        let service = self.service.lock().take();
        if let Some(service) = service {
            debug!(endpoint = %self.name, "stopping websocket client");
            service.stop();
        }
        self.dispatcher.stop();
    }
}

impl Drop for WebsocketClient {
    fn drop(&mut self) {
        self.stop();
    }
}
