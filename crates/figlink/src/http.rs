//! Static HTTP server for the browser frontend.
//!
//! Serves the webapp plus two small JSON routes: `/ws_port` tells the page
//! where the figure's WebSocket server listens, `/loaded` answers once the server is up.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use axum::Router;
use axum::extract::State;
use axum::response::{Html, Json};
use axum::routing::get;
use figlink_core::logging::current_dispatch;
use figlink_settings::HttpSettings;
use figlink_ws::service::ServiceThread;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{Dispatch, debug, error, info};

use crate::error::FigureError;

/// The frontend bundled with the crate.
pub const DEFAULT_HTML: &str = include_str!("../webapp/index.html");

/// What the server answers for everything but its JSON routes.
#[derive(Clone, Debug)]
pub enum HttpContent {
    /// A webapp directory, served file by file.
    Directory(PathBuf),
    /// A single page served at `/`.
    Html(Arc<str>),
}

impl Default for HttpContent {
    fn default() -> Self {
        Self::Html(Arc::from(DEFAULT_HTML))
    }
}

#[derive(Clone)]
struct HttpState {
    ws_port: Arc<AtomicU16>,
}

/// Build the router for `content`, advertising the port held in `ws_port`.
fn router(content: &HttpContent, ws_port: Arc<AtomicU16>) -> Router {
    let routes = Router::new()
        .route("/ws_port", get(ws_port_handler))
        .route("/loaded", get(loaded_handler));
    let routes = match content {
        HttpContent::Directory(dir) => routes.fallback_service(ServeDir::new(dir)),
        HttpContent::Html(html) => {
            let html = Arc::clone(html);
            routes.route(
                "/",
                get(move || {
                    let html = Arc::clone(&html);
                    async move { Html(html.to_string()) }
                }),
            )
        }
    };
    routes
        .layer(TraceLayer::new_for_http())
        .with_state(HttpState { ws_port })
}

/// GET /ws_port
async fn ws_port_handler(State(state): State<HttpState>) -> Json<Value> {
    debug!("websocket port requested");
    Json(json!({ "port": state.ws_port.load(Ordering::SeqCst) }))
}

/// GET /loaded
async fn loaded_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// HTTP server on its own service thread.
pub struct HttpServer {
    content: HttpContent,
    settings: HttpSettings,
    ws_port: Arc<AtomicU16>,
    port: AtomicU16,
    service: Mutex<Option<ServiceThread>>,
    dispatch: Dispatch,
}

impl HttpServer {
    /// Create a stopped server.
    pub fn new(content: HttpContent, settings: HttpSettings) -> Self {
        Self {
            content,
            settings,
            ws_port: Arc::new(AtomicU16::new(0)),
            port: AtomicU16::new(0),
            service: Mutex::new(None),
            dispatch: current_dispatch(),
        }
    }

    /// Port reported by `/ws_port`.
    pub fn set_websocket_port(&self, port: u16) {
        debug!(port, "advertising websocket port");
        self.ws_port.store(port, Ordering::SeqCst);
    }

    /// Bind and start serving. Returns the bound port; no-op when running.
    pub fn start(&self) -> Result<u16, FigureError> {
        let mut service = self.service.lock();
        if service.is_some() {
            return Ok(self.port());
        }

        let host = if self.settings.bind_address.is_empty() {
            "0.0.0.0"
        } else {
            self.settings.bind_address.as_str()
        };
        let address = format!("{host}:{}", self.settings.port);
        let listener = std::net::TcpListener::bind((host, self.settings.port))
            .map_err(|source| FigureError::HttpBind { address, source })?;
        listener.set_nonblocking(true)?;
        let bound = listener.local_addr()?.port();

        let app = router(&self.content, Arc::clone(&self.ws_port));
        let thread = ServiceThread::spawn("figure-http", self.dispatch.clone(), move |token| {
            serve(listener, app, token)
        })?;

        self.port.store(bound, Ordering::SeqCst);
        *service = Some(thread);
        info!(host, port = bound, "http server listening");
        Ok(bound)
    }

    /// Bound port, `0` before [`start`](Self::start).
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    /// Whether the server is running.
    pub fn is_running(&self) -> bool {
        self.service.lock().is_some()
    }

    /// Stop serving and join the thread. Idempotent.
    pub fn stop(&self) {
        let service = self.service.lock().take();
        if let Some(service) = service {
            service.stop();
            debug!("http server stopped");
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(listener: std::net::TcpListener, app: Router, token: CancellationToken) {
    let listener = match tokio::net::TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, "failed to register http listener");
            return;
        }
    };
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await
    {
        error!(error = %err, "http server failed");
    }
}
