//! Registry notifications and their push-event bridge.

use crate::models::{LogEntry, LogKind, SessionStatus};
use chrono::{DateTime, Utc};
use futures_util::stream::{Stream, StreamExt};
use scout_core::FinalResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// Receives registry notifications synchronously, in registration order.
/// Every method defaults to doing nothing.
pub trait SessionObserver: Send + Sync {
    fn on_created(&self, _session_id: &str) {}
    fn on_status_changed(&self, _session_id: &str, _status: SessionStatus) {}
    fn on_log_appended(&self, _session_id: &str, _entry: &LogEntry) {}
    fn on_completed(&self, _session_id: &str, _result: &FinalResult) {}
    fn on_error(&self, _session_id: &str, _message: &str) {}
}

/// Typed push event for a single session's event channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEvent {
    pub session_id: String,
    pub kind: LogKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Republishes every appended log entry on a broadcast channel.
///
/// Status changes, results and errors all land in the log buffer, so
/// forwarding log appends alone gives subscribers each notification once.
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Events for one session. Lagged receivers skip what they missed.
    pub fn subscribe(&self, session_id: &str) -> impl Stream<Item = SessionEvent> + Send + 'static {
        let session_id = session_id.to_string();
        BroadcastStream::new(self.sender.subscribe()).filter_map(move |item| {
            let event = match item {
                Ok(event) if event.session_id == session_id => Some(event),
                Ok(_) => None,
                Err(e) => {
                    debug!("Event subscriber lagged: {}", e);
                    None
                }
            };
            async move { event }
        })
    }
}

impl SessionObserver for EventBroadcaster {
    fn on_log_appended(&self, session_id: &str, entry: &LogEntry) {
        // No receivers is fine
        let _ = self.sender.send(SessionEvent {
            session_id: session_id.to_string(),
            kind: entry.kind,
            message: entry.message.clone(),
            data: entry.data.clone(),
            timestamp: entry.timestamp,
        });
    }
}
