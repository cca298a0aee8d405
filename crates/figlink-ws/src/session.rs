//! Peer session lifecycle: one connected socket from handshake to close.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::connection::PeerConnection;
use crate::dispatcher::CallbackDispatcher;
use crate::peers::PeerSet;

/// Interval between Ping frames sent to the peer.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long a peer may stay silent before it is dropped.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// How long the write task gets to flush a Close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// What a session needs from its endpoint.
pub(crate) struct SessionContext {
    pub endpoint: String,
    pub peers: Arc<PeerSet>,
    pub dispatcher: CallbackDispatcher,
    pub outbound_queue: usize,
}

/// Run a peer session until the peer closes, the socket fails, or `token`
/// is cancelled.
///
/// 1. Registers the peer in the endpoint's peer set
/// 2. Pushes inbound text (and UTF-8 binary) frames into the dispatcher
/// 3. Forwards queued outbound messages and sends periodic Pings
/// 4. Removes the peer and sends a Close frame on the way out
pub(crate) async fn run_peer_session<S>(
    ws: WebSocketStream<S>,
    peer_id: String,
    ctx: Arc<SessionContext>,
    token: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(ctx.outbound_queue.max(1));
    let connection = Arc::new(PeerConnection::new(peer_id.clone(), send_tx));

    let started = Instant::now();
    ctx.peers.insert(Arc::clone(&connection));
    info!(endpoint = %ctx.endpoint, peer_id, "peer connected");
    counter!("ws_connections_total").increment(1);

    // The writer only holds a weak reference so the channel closes once the
    // session and the peer set let go of the connection.
    let heartbeat: Weak<PeerConnection> = Arc::downgrade(&connection);
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    if let Some(text) = msg {
                        if ws_tx.send(Message::text(String::clone(&text))).await.is_err() {
                            break;
                        }
                    } else {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    let Some(peer) = heartbeat.upgrade() else { break };
                    if peer.is_stale(PONG_TIMEOUT) {
                        warn!(peer_id = %peer.id, "peer unresponsive for {PONG_TIMEOUT:?}, disconnecting");
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });
    let outbound_abort = outbound.abort_handle();

    loop {
        let frame = tokio::select! {
            () = token.cancelled() => {
                debug!(endpoint = %ctx.endpoint, peer_id, "session cancelled");
                break;
            }
            frame = ws_rx.next() => frame,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(error)) => {
                debug!(endpoint = %ctx.endpoint, peer_id, %error, "socket error");
                break;
            }
            None => break,
        };

        match msg {
            Message::Text(text) => ctx.dispatcher.push(text.as_str().to_owned()),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(text) => ctx.dispatcher.push(text),
                Err(_) => {
                    info!(endpoint = %ctx.endpoint, peer_id, len = data.len(), "received non-UTF8 binary frame");
                }
            },
            Message::Close(_) => {
                debug!(endpoint = %ctx.endpoint, peer_id, "peer sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => connection.touch(),
            Message::Frame(_) => trace!(peer_id, "ignoring raw frame"),
        }
    }

    let _ = ctx.peers.remove(&peer_id);
    drop(connection);
    if tokio::time::timeout(CLOSE_GRACE, outbound).await.is_err() {
        outbound_abort.abort();
    }

    info!(endpoint = %ctx.endpoint, peer_id, "peer disconnected");
    counter!("ws_disconnections_total").increment(1);
    histogram!("ws_connection_duration_seconds").record(started.elapsed().as_secs_f64());
}
