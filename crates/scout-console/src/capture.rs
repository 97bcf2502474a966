//! Routing process log output into a session's log buffer.
//!
//! [`CaptureLayer`] is a `tracing_subscriber` layer installed next to the
//! normal fmt layer, so every event still reaches the terminal. While a
//! [`CaptureGuard`] is alive, each event is formatted, classified and
//! appended to the guarded session. Only one session can hold capture at a
//! time; asking for a second one is an error rather than silently stealing it.

use crate::models::LogKind;
use crate::registry::SessionRegistry;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use scout_core::reasoning::strip_ansi;
use serde_json::Value;
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Target used when session entries are mirrored to tracing. The capture
/// layer ignores it so mirrored lines are not recorded a second time.
pub const MIRROR_TARGET: &str = "scout::session";

static THINKING_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[^\w\s]\x{FE0F}?\s*)?Thinking:\s*").unwrap());
static ACTION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[^\w\s]\x{FE0F}?\s*)?Action:\s*").unwrap());

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static IN_CAPTURE: Cell<bool> = const { Cell::new(false) };
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Log capture is already active for session {session_id}")]
    AlreadyActive { session_id: String },
}

#[derive(Debug, Clone)]
struct ActiveCapture {
    session_id: String,
    token: u64,
}

struct CaptureState {
    registry: Arc<SessionRegistry>,
    active: Mutex<Option<ActiveCapture>>,
}

/// Handle to the capture machinery. Cheap to clone.
#[derive(Clone)]
pub struct LogCapture {
    state: Arc<CaptureState>,
}

impl LogCapture {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            state: Arc::new(CaptureState {
                registry,
                active: Mutex::new(None),
            }),
        }
    }

    /// Layer to install in the subscriber stack
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer {
            capture: self.clone(),
        }
    }

    /// Start routing log output to `session_id`
    pub fn start_logging(&self, session_id: &str) -> Result<CaptureGuard, CaptureError> {
        let mut active = self.state.active.lock();
        if let Some(current) = active.as_ref() {
            return Err(CaptureError::AlreadyActive {
                session_id: current.session_id.clone(),
            });
        }

        let token = NEXT_TOKEN.fetch_add(1, Ordering::SeqCst);
        *active = Some(ActiveCapture {
            session_id: session_id.to_string(),
            token,
        });
        Ok(CaptureGuard {
            capture: self.clone(),
            session_id: session_id.to_string(),
            token,
        })
    }

    /// Stop routing. Equivalent to dropping the guard.
    pub fn stop_logging(&self, guard: CaptureGuard) {
        drop(guard);
    }

    pub fn active_session(&self) -> Option<String> {
        self.state
            .active
            .lock()
            .as_ref()
            .map(|active| active.session_id.clone())
    }

    fn release(&self, token: u64) {
        let mut active = self.state.active.lock();
        if active.as_ref().map(|a| a.token) == Some(token) {
            *active = None;
        }
    }

    fn record(&self, level: &Level, formatted: &str) {
        let Some(session_id) = self.active_session() else {
            return;
        };
        if let Some((kind, message)) = classify(level, formatted) {
            self.state.registry.add_log(&session_id, kind, &message, None);
        }
    }
}

/// Proof of holding capture for one session
#[must_use = "capture stops as soon as the guard is dropped"]
pub struct CaptureGuard {
    capture: LogCapture,
    session_id: String,
    token: u64,
}

impl CaptureGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.capture.release(self.token);
    }
}

impl fmt::Debug for CaptureGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureGuard")
            .field("session_id", &self.session_id)
            .finish()
    }
}

pub struct CaptureLayer {
    capture: LogCapture,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target() == MIRROR_TARGET {
            return;
        }
        // Appending to the registry may log; don't capture our own output
        let Some(_reentry) = ReentryGuard::enter() else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.capture.record(metadata.level(), &visitor.finish());
    }
}

/// Marks this thread as inside the capture layer until dropped, unwinding
/// included
struct ReentryGuard;

impl ReentryGuard {
    fn enter() -> Option<Self> {
        if IN_CAPTURE.with(|flag| flag.replace(true)) {
            None
        } else {
            Some(ReentryGuard)
        }
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        IN_CAPTURE.with(|flag| flag.set(false));
    }
}

/// Map a formatted line to a log kind. Blank lines and bare markers yield nothing.
pub fn classify(level: &Level, formatted: &str) -> Option<(LogKind, String)> {
    if THINKING_MARKER.is_match(formatted) {
        let text = THINKING_MARKER.replace(formatted, "").trim().to_string();
        return (!text.is_empty()).then_some((LogKind::Think, text));
    }
    if ACTION_MARKER.is_match(formatted) {
        let text = ACTION_MARKER.replace(formatted, "").trim().to_string();
        return (!text.is_empty()).then_some((LogKind::Action, text));
    }

    let text = formatted.trim();
    if text.is_empty() {
        return None;
    }
    let entry = match *level {
        Level::ERROR => (LogKind::Error, text.to_string()),
        Level::WARN => (LogKind::Log, format!("WARN: {}", text)),
        Level::DEBUG | Level::TRACE => (LogKind::Log, format!("DEBUG: {}", text)),
        _ => (LogKind::Log, text.to_string()),
    };
    Some(entry)
}

/// Renders an event as one line: the message, then `key=value` fields
#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn finish(self) -> String {
        let mut parts = Vec::with_capacity(self.fields.len() + 1);
        if let Some(message) = self.message {
            parts.push(message);
        }
        parts.extend(self.fields);
        parts.join(" ")
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, strip_ansi(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, render_error(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let text = format!("{:?}", value);
        if field.name() == "message" {
            self.push(field, strip_ansi(&text));
        } else {
            self.push(field, render_debug(&text));
        }
    }
}

/// `Error: message`, then one `caused by:` line per source
fn render_error(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = format!("Error: {}", error);
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(&format!("\ncaused by: {}", cause));
        source = cause.source();
    }
    rendered
}

/// Structured values come out as pretty JSON, anything else as written
fn render_debug(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| text.to_string())
        }
        _ => strip_ansi(text),
    }
}
