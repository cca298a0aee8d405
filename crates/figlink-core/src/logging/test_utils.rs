//! Test utilities for capturing and asserting on tracing events.
//!
//! Endpoints log from their service and executor threads, so the capture
//! store is shared across threads and [`CapturedLogs::wait_for`] lets a test
//! block until a background event shows up.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// One recorded event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Event level.
    pub level: Level,
    /// Module path that emitted the event.
    pub target: String,
    /// Name of the thread that emitted the event.
    pub thread: Option<String>,
    /// Rendered message.
    pub message: String,
    /// Structured fields in recording order.
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    /// Value of the named field, if recorded.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn matches(&self, level: Level, message: &str) -> bool {
        self.level == level && self.message.contains(message)
    }
}

#[derive(Default)]
struct Store {
    events: Mutex<Vec<CapturedEvent>>,
    arrived: Condvar,
}

/// Handle to the events recorded by [`capture_logs`].
#[derive(Clone, Default)]
pub struct CapturedLogs {
    store: Arc<Store>,
}

impl CapturedLogs {
    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.store.events.lock().clone()
    }

    /// Whether any event's message contains `message`.
    pub fn has_message(&self, message: &str) -> bool {
        self.store
            .events
            .lock()
            .iter()
            .any(|event| event.message.contains(message))
    }

    /// Whether an event at `level` contains `message`.
    pub fn has_event(&self, level: Level, message: &str) -> bool {
        self.find(level, message).is_some()
    }

    /// First event at `level` whose message contains `message`.
    pub fn find(&self, level: Level, message: &str) -> Option<CapturedEvent> {
        self.store
            .events
            .lock()
            .iter()
            .find(|event| event.matches(level, message))
            .cloned()
    }

    /// Block until a matching event is recorded or `timeout` elapses.
    pub fn wait_for(&self, level: Level, message: &str, timeout: Duration) -> Option<CapturedEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = self.store.events.lock();
        loop {
            if let Some(event) = events.iter().find(|event| event.matches(level, message)) {
                return Some(event.clone());
            }
            if self.store.arrived.wait_until(&mut events, deadline).timed_out() {
                return None;
            }
        }
    }

    fn record(&self, event: CapturedEvent) {
        self.store.events.lock().push(event);
        let _ = self.store.arrived.notify_all();
    }
}

#[derive(Default)]
struct Fields {
    message: String,
    fields: Vec<(String, String)>,
}

impl Fields {
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_owned(), value));
        }
    }
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_owned());
    }
}

struct CaptureLayer {
    logs: CapturedLogs,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        let metadata = event.metadata();
        self.logs.record(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_owned(),
            thread: std::thread::current().name().map(str::to_owned),
            message: fields.message,
            fields: fields.fields,
        });
    }
}

/// Install a capturing subscriber as the current thread's default.
///
/// Components built while the guard is alive capture this dispatcher and
/// carry it onto their own threads, so their background logs are recorded
/// too. Keep the guard for the duration of the test.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry()
        .with(CaptureLayer { logs: logs.clone() })
        .with(LevelFilter::TRACE)
        .set_default();
    (logs, guard)
}
