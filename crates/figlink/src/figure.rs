//! The figure session: one browser page, one JSON-RPC session.
//!
//! A [`Figure`] starts a WebSocket server and an HTTP server for the
//! frontend. Every plotting operation becomes a `Plotly.*` call that waits a
//! bounded time for the page to answer; an unanswered, failed or rejected
//! call turns into `false` instead of an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use figlink_browser::{self as browser, HeadlessBrowser};
use figlink_core::SubscriptionId;
use figlink_rpc::{CallError, JsonRpc};
use figlink_settings::FigureSettings;
use figlink_ws::{WebsocketEndpoint, WebsocketServer};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::error::FigureError;
use crate::events::EventRegistry;
use crate::http::{HttpContent, HttpServer};

/// The page's answer to `Plotly.downloadImage`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadReply {
    file_name: String,
}

#[derive(Default)]
struct BrowserState {
    headless: bool,
    download_dir: Option<PathBuf>,
    process: Option<HeadlessBrowser>,
}

struct FigureState {
    settings: FigureSettings,
    server: Arc<WebsocketServer>,
    rpc: JsonRpc,
    http: HttpServer,
    events: Arc<EventRegistry>,
    connected_once: AtomicBool,
    browser: Mutex<BrowserState>,
}

/// A Plotly.js figure rendered by a browser page.
pub struct Figure {
    state: FigureState,
}

impl Figure {
    /// Create a figure with the global settings.
    ///
    /// Serves `http.webappDir` when configured, the bundled page otherwise.
    pub fn new() -> Result<Self, FigureError> {
        Self::with_settings(figlink_settings::get_settings().clone())
    }

    /// Create a figure with explicit settings.
    pub fn with_settings(settings: FigureSettings) -> Result<Self, FigureError> {
        let content = settings
            .http
            .webapp_dir
            .as_ref()
            .map_or_else(HttpContent::default, |dir| HttpContent::Directory(dir.into()));
        Self::with_content(content, settings)
    }

    /// Create a figure serving the webapp in `dir`.
    pub fn with_webapp(dir: impl Into<PathBuf>, settings: FigureSettings) -> Result<Self, FigureError> {
        Self::with_content(HttpContent::Directory(dir.into()), settings)
    }

    /// Create a figure serving a single HTML page.
    pub fn with_html(html: &str, settings: FigureSettings) -> Result<Self, FigureError> {
        Self::with_content(HttpContent::Html(Arc::from(html)), settings)
    }

    fn with_content(content: HttpContent, settings: FigureSettings) -> Result<Self, FigureError> {
        let server = Arc::new(WebsocketServer::with_settings(
            "figure",
            settings.websocket.clone(),
        ));
        let ws_port = server.serve(&settings.websocket.bind_address, settings.websocket.port)?;

        let http = HttpServer::new(content, settings.http.clone());
        http.set_websocket_port(ws_port);
        let http_port = http.start()?;
        let rpc = JsonRpc::new(Arc::clone(&server));

        info!(url = %format!("http://localhost:{http_port}"), ws_port, "figure created");
        Ok(Self {
            state: FigureState {
                settings,
                server,
                rpc,
                http,
                events: Arc::new(EventRegistry::new()),
                connected_once: AtomicBool::new(false),
                browser: Mutex::new(BrowserState::default()),
            },
        })
    }

    /// URL of the figure page.
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.state.http.port())
    }

    /// Port of the HTTP server.
    pub fn http_port(&self) -> u16 {
        self.state.http.port()
    }

    /// Port of the WebSocket server the page connects to.
    pub fn ws_port(&self) -> u16 {
        self.state.server.port()
    }

    /// The JSON-RPC session, for methods beyond the built-in operations.
    pub fn session(&self) -> &JsonRpc {
        &self.state.rpc
    }

    /// Whether a page is connected.
    pub fn is_open(&self) -> bool {
        self.state.server.has_client()
    }

    /// Block until every page has disconnected.
    pub fn wait_close(&self) {
        self.state.server.wait_until_no_client();
    }

    /// Gate the first call on a page connection, once per figure.
    ///
    /// Only the first call waits. Later calls go straight to the page and
    /// fail through the call timeout when it is absent.
    fn ensure_connected(&self) -> bool {
        if self.state.connected_once.swap(true, Ordering::SeqCst) {
            return true;
        }
        self.wait_for_page()
    }

    /// Retry `rpc.connectionWaitMs` waits for a page, forever unless
    /// `rpc.maxConnectionAttempts` is set.
    fn wait_for_page(&self) -> bool {
        let rpc = &self.state.settings.rpc;
        let mut attempts: u32 = 0;
        while !self.state.server.wait_connection(rpc.connection_wait()) {
            attempts = attempts.saturating_add(1);
            if rpc.max_connection_attempts.is_some_and(|max| attempts >= max) {
                error!(attempts, "no browser connected, giving up");
                return false;
            }
            warn!(url = %self.url(), "waiting for a browser to open the figure");
        }
        true
    }

    /// Call a Plotly method on the page and wait for its result.
    ///
    /// `None` when no page connected, the page reported an error, or no answer
    /// came within `rpc.callTimeoutMs` (the call is then cancelled).
    pub fn call_remote(&self, method: &str, params: Value) -> Option<Value> {
        if !self.ensure_connected() {
            return None;
        }
        let (pending, cancel) = self.state.rpc.call(method, params);
        match pending.wait_timeout(self.state.settings.rpc.call_timeout()) {
            Some(Ok(result)) => Some(result),
            Some(Err(CallError::Remote(body))) => {
                warn!(method, code = body.code, message = %body.message, "remote call failed");
                None
            }
            Some(Err(CallError::Cancelled)) => {
                debug!(method, "call cancelled");
                None
            }
            None => {
                cancel.cancel();
                warn!(method, "call timed out");
                None
            }
        }
    }

    fn call(&self, method: &str, params: Value) -> bool {
        self.call_remote(method, params).is_some()
    }

    // ── Plotly operations ───────────────────────────────────────────

    /// `Plotly.newPlot`: draw a new plot.
    pub fn new_plot(&self, data: Value, layout: Value, config: Value) -> bool {
        self.call(
            "Plotly.newPlot",
            json!({ "data": data, "layout": layout, "config": config }),
        )
    }

    /// `Plotly.update`: restyle traces and relayout in one call.
    pub fn update(&self, trace_update: Value, layout_update: Value) -> bool {
        self.call(
            "Plotly.update",
            json!({ "traceUpdate": trace_update, "layoutUpdate": layout_update }),
        )
    }

    /// `Plotly.relayout`
    pub fn relayout(&self, layout: Value) -> bool {
        self.call("Plotly.relayout", json!({ "layout": layout }))
    }

    /// `Plotly.redraw`
    pub fn redraw(&self) -> bool {
        self.call("Plotly.redraw", json!({}))
    }

    /// `Plotly.purge`: remove all data and layout.
    pub fn purge(&self) -> bool {
        self.call("Plotly.purge", json!({}))
    }

    /// `Plotly.restyle`
    pub fn restyle(&self, aobj: Value, traces: Value) -> bool {
        self.call("Plotly.restyle", json!({ "aobj": aobj, "traces": traces }))
    }

    /// `Plotly.addTraces`
    pub fn add_traces(&self, traces: Value, new_indices: Value) -> bool {
        self.call(
            "Plotly.addTraces",
            json!({ "traces": traces, "newIndices": new_indices }),
        )
    }

    /// `Plotly.deleteTraces`
    pub fn delete_traces(&self, indices: Value) -> bool {
        self.call("Plotly.deleteTraces", json!({ "indices": indices }))
    }

    /// `Plotly.moveTraces`
    pub fn move_traces(&self, current_indices: Value, new_indices: Value) -> bool {
        self.call(
            "Plotly.moveTraces",
            json!({ "currentIndices": current_indices, "newIndices": new_indices }),
        )
    }

    /// `Plotly.extendTraces`
    pub fn extend_traces(&self, update: Value, indices: Value, max_points: Value) -> bool {
        self.call(
            "Plotly.extendTraces",
            json!({ "update": update, "indices": indices, "maxPoints": max_points }),
        )
    }

    /// `Plotly.prependTraces`
    pub fn prepend_traces(&self, update: Value, indices: Value) -> bool {
        self.call(
            "Plotly.prependTraces",
            json!({ "update": update, "indices": indices }),
        )
    }

    /// `Plotly.react`
    pub fn react(&self, data: Value, layout: Value, config: Value) -> bool {
        self.call(
            "Plotly.react",
            json!({ "data": data, "layout": layout, "config": config }),
        )
    }

    /// `Plotly.addFrames`
    pub fn add_frames(&self, frames: Value) -> bool {
        self.call("Plotly.addFrames", json!({ "frames": frames }))
    }

    /// `Plotly.deleteFrames`
    pub fn delete_frames(&self, frames: Value) -> bool {
        self.call("Plotly.deleteFrames", json!({ "frames": frames }))
    }

    /// `Plotly.animate`
    pub fn animate(&self, frame_or_group_name_or_frame_list: Value, opts: Value) -> bool {
        self.call(
            "Plotly.animate",
            json!({
                "frameOrGroupNameOrFrameList": frame_or_group_name_or_frame_list,
                "opts": opts,
            }),
        )
    }

    /// `Plotly.downloadImage`
    ///
    /// In headless mode also waits for the file named by the reply's
    /// `fileName` to appear in the download directory.
    pub fn download_image(&self, opts: Value) -> bool {
        let Some(result) = self.call_remote("Plotly.downloadImage", json!({ "opts": opts })) else {
            return false;
        };

        let download_dir = {
            let browser = self.state.browser.lock();
            if browser.headless { browser.download_dir.clone() } else { None }
        };
        let Some(dir) = download_dir else {
            return true;
        };
        let reply: DownloadReply = match serde_json::from_value(result) {
            Ok(reply) => reply,
            Err(err) => {
                error!(error = %err, "download reply has no fileName");
                return false;
            }
        };

        let path = dir.join(reply.file_name);
        let browser_settings = &self.state.settings.browser;
        if browser::wait_for_file(
            &path,
            browser_settings.download_timeout(),
            browser_settings.download_poll(),
        ) {
            debug!(path = %path.display(), "image downloaded");
            true
        } else {
            error!(path = %path.display(), "image download timed out");
            false
        }
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Subscribe `callback` to a Plotly event such as `plotly_click`.
    ///
    /// Subscriptions are additive. The page forwards each event as a
    /// notification named by the subscription id.
    ///
    /// Callbacks run on the session's executor thread, which also delivers
    /// call results: a figure call made from inside a callback waits out its
    /// timeout and fails.
    pub fn on<F>(&self, event: &str, callback: F) -> bool
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let id = self.state.events.subscribe(event, Arc::new(callback));
        let events = Arc::clone(&self.state.events);
        let target = id.clone();
        self.state.rpc.register_notification(
            id.as_str(),
            Arc::new(move |payload: Value| {
                let _ = events.deliver(&target, payload);
            }),
        );

        let registered = self.call("Plotly.on", json!({ "event": event, "eventId": id.as_str() }));
        if registered {
            debug!(event, event_id = %id, "event listener registered");
        }
        registered
    }

    /// Remove every subscription of `event`, locally and on the page.
    ///
    /// Local handlers are removed even when the page does not answer.
    pub fn remove_all_listeners(&self, event: &str) -> bool {
        let removed = self.call("Plotly.removeAllListeners", json!({ "event": event }));
        for id in self.state.events.remove_event(event) {
            let _ = self.state.rpc.unregister_notification(id.as_str());
        }
        removed
    }

    /// Subscription ids currently registered for `event`.
    pub fn subscriptions(&self, event: &str) -> Vec<SubscriptionId> {
        self.state.events.subscriptions(event)
    }

    // ── Browser ─────────────────────────────────────────────────────

    /// Open the figure in a browser and wait for it to connect.
    ///
    /// Desktop mode needs a display. Headless mode launches Chromium and
    /// points its downloads at `browser.downloadDir` or the user's download
    /// directory.
    pub fn open_browser(&self, headless: bool) -> bool {
        let url = self.url();
        if headless {
            if !self.launch_headless(&url) {
                return false;
            }
        } else if browser::is_display_available() {
            if let Err(err) = browser::open_browser(&url) {
                error!(error = %err, "failed to open browser");
                return false;
            }
        } else {
            error!("display is not available, skipping browser opening");
            return false;
        }

        self.state.browser.lock().headless = headless;
        self.state.connected_once.store(true, Ordering::SeqCst);
        self.wait_for_page()
    }

    fn launch_headless(&self, url: &str) -> bool {
        let settings = &self.state.settings.browser;
        let port = settings.remote_debugging_port;
        let process = match browser::launch_headless(url, port) {
            Ok(process) => process,
            Err(err) => {
                error!(error = %err, "failed to launch headless browser");
                return false;
            }
        };
        self.state.browser.lock().process = Some(process);

        std::thread::sleep(settings.startup_delay());
        let dir = settings
            .download_dir
            .as_ref()
            .map_or_else(browser::default_download_directory, PathBuf::from);
        if let Err(err) = browser::set_download_directory(&dir, port, settings.download_timeout()) {
            error!(error = %err, "failed to set download directory");
            return false;
        }
        self.state.browser.lock().download_dir = Some(dir);
        true
    }

    /// Redirect downloads of a headless browser to `dir`.
    pub fn set_download_directory(&self, dir: &Path, remote_debugging_port: u16) -> bool {
        if !self.state.browser.lock().headless {
            warn!("setting the download directory is only available in headless mode");
            return false;
        }
        match browser::set_download_directory(
            dir,
            remote_debugging_port,
            self.state.settings.browser.download_timeout(),
        ) {
            Ok(()) => {
                self.state.browser.lock().download_dir = Some(dir.to_path_buf());
                true
            }
            Err(err) => {
                error!(error = %err, "failed to set download directory");
                false
            }
        }
    }
}

impl Drop for Figure {
    fn drop(&mut self) {
        if let Some(mut process) = self.state.browser.lock().process.take() {
            process.kill();
        }
        self.state.http.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figlink_rpc::RpcError;
    use figlink_ws::WebsocketClient;
    use std::time::{Duration, Instant};

    fn local_settings() -> FigureSettings {
        let mut settings = FigureSettings::default();
        settings.websocket.bind_address = "127.0.0.1".into();
        settings.http.bind_address = "127.0.0.1".into();
        settings.rpc.connection_wait_ms = 20;
        settings.rpc.max_connection_attempts = Some(2);
        settings
    }

    #[test]
    fn construction_starts_both_servers() {
        let figure = Figure::with_html("<p>plot</p>", local_settings()).unwrap();
        assert_ne!(figure.ws_port(), 0);
        assert_ne!(figure.http_port(), 0);
        assert_eq!(figure.url(), format!("http://localhost:{}", figure.http_port()));
        assert!(!figure.is_open());
    }

    #[test]
    fn taken_http_port_fails_construction() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut settings = local_settings();
        settings.http.port = taken.local_addr().unwrap().port();
        assert!(matches!(
            Figure::with_html("", settings),
            Err(FigureError::HttpBind { .. })
        ));
    }

    #[test]
    fn calls_without_page_fail_after_bounded_wait() {
        let figure = Figure::with_html("", local_settings()).unwrap();
        assert!(!figure.redraw());
        assert!(!figure.new_plot(json!([]), json!({}), json!({})));
    }

    #[test]
    fn download_directory_requires_headless() {
        let figure = Figure::with_html("", local_settings()).unwrap();
        assert!(!figure.set_download_directory(Path::new("/tmp"), 9222));
    }

    #[test]
    fn failed_on_still_tracks_then_removes_subscription() {
        let figure = Figure::with_html("", local_settings()).unwrap();
        assert!(!figure.on("plotly_click", |_payload| {}));
        let ids = figure.subscriptions("plotly_click");
        assert_eq!(ids.len(), 1);
        assert!(figure.session().has_notification(ids[0].as_str()));

        assert!(!figure.remove_all_listeners("plotly_click"));
        assert!(figure.subscriptions("plotly_click").is_empty());
        assert!(!figure.session().has_notification(ids[0].as_str()));
    }

    #[test]
    fn only_the_first_call_waits_for_a_page() {
        let mut settings = local_settings();
        settings.rpc.connection_wait_ms = 150;
        settings.rpc.call_timeout_ms = 20;
        let figure = Figure::with_html("", settings).unwrap();

        let start = Instant::now();
        assert!(!figure.redraw());
        assert!(start.elapsed() >= Duration::from_millis(300));

        let start = Instant::now();
        assert!(!figure.redraw());
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn failed_devtools_call_keeps_previous_download_directory() {
        let mut settings = local_settings();
        settings.browser.download_timeout_ms = 500;
        let figure = Figure::with_html("", settings).unwrap();
        let previous = tempfile::tempdir().unwrap();
        headless(&figure, previous.path());

        let closed_port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let next = tempfile::tempdir().unwrap();
        assert!(!figure.set_download_directory(next.path(), closed_port));
        assert_eq!(
            figure.state.browser.lock().download_dir.as_deref(),
            Some(previous.path())
        );
    }

    // ── Headless downloads ──────────────────────────────────────────

    fn download_settings() -> FigureSettings {
        let mut settings = local_settings();
        settings.rpc.call_timeout_ms = 2_000;
        settings.rpc.connection_wait_ms = 1_000;
        settings.browser.download_timeout_ms = 300;
        settings.browser.download_poll_ms = 10;
        settings
    }

    fn headless(figure: &Figure, dir: &Path) {
        let mut browser = figure.state.browser.lock();
        browser.headless = true;
        browser.download_dir = Some(dir.to_path_buf());
    }

    /// A page answering `Plotly.downloadImage` with `reply`, optionally
    /// writing `plot.png` into `dir` first the way a browser download would.
    fn download_page(figure: &Figure, dir: Option<PathBuf>, reply: Value) -> JsonRpc {
        let client = Arc::new(WebsocketClient::new("download-page"));
        client
            .connect(&format!("ws://127.0.0.1:{}", figure.ws_port()))
            .unwrap();
        let page = JsonRpc::new(client);
        page.register_handler(
            "Plotly.downloadImage",
            move |_params: Value| -> Result<Value, RpcError> {
                if let Some(dir) = &dir {
                    std::fs::write(dir.join("plot.png"), b"\x89PNG")
                        .map_err(|err| RpcError::internal(err.to_string()))?;
                }
                Ok(reply.clone())
            },
        );
        page
    }

    #[test]
    fn headless_download_waits_for_the_file() {
        let figure = Figure::with_html("", download_settings()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        headless(&figure, dir.path());
        let _page = download_page(
            &figure,
            Some(dir.path().to_path_buf()),
            json!({ "fileName": "plot.png" }),
        );

        assert!(figure.download_image(json!({ "format": "png", "filename": "plot" })));
        assert!(dir.path().join("plot.png").exists());
    }

    #[test]
    fn headless_download_fails_when_file_never_appears() {
        let figure = Figure::with_html("", download_settings()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        headless(&figure, dir.path());
        let _page = download_page(&figure, None, json!({ "fileName": "plot.png" }));

        assert!(!figure.download_image(json!({ "format": "png", "filename": "plot" })));
    }

    #[test]
    fn headless_download_needs_a_file_name() {
        let figure = Figure::with_html("", download_settings()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        headless(&figure, dir.path());
        let _page = download_page(&figure, Some(dir.path().to_path_buf()), json!({}));

        assert!(!figure.download_image(json!({})));
    }
}
