use crate::capture::MIRROR_TARGET;
use crate::models::{LogKind, SessionStatus};
use crate::registry::SessionRegistry;
use scout_core::{EventSink, RunStatus, TaskEvent};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, trace};

/// Event sink writing an orchestrator's events into one registry session.
///
/// Entries are mirrored to tracing under [`MIRROR_TARGET`] for the terminal.
/// Terminal outcomes are left to `set_result` / `set_error`, which carry the
/// full result, so completed and error statuses are only mirrored here.
pub struct SessionSink {
    registry: Arc<SessionRegistry>,
    session_id: String,
}

impl SessionSink {
    pub fn new(registry: Arc<SessionRegistry>, session_id: &str) -> Self {
        Self {
            registry,
            session_id: session_id.to_string(),
        }
    }
}

impl EventSink for SessionSink {
    fn emit(&self, event: TaskEvent) {
        let id = self.session_id.as_str();
        match event {
            TaskEvent::Think { step, text, source } => {
                info!(
                    target: MIRROR_TARGET,
                    session = id,
                    "💭 Thinking: [step {}] {}",
                    step,
                    text
                );
                self.registry.add_log(
                    id,
                    LogKind::Think,
                    &text,
                    Some(json!({ "step": step, "source": source })),
                );
            }
            TaskEvent::Action { step, tool_name, args } => {
                info!(target: MIRROR_TARGET, session = id, "⚡ Action: {} {}", tool_name, args);
                self.registry.add_log(
                    id,
                    LogKind::Action,
                    &tool_name,
                    Some(json!({ "step": step, "toolName": tool_name, "args": args })),
                );
            }
            TaskEvent::Status { status } => match status {
                RunStatus::Running => self.registry.update_status(id, SessionStatus::Running),
                other => debug!(target: MIRROR_TARGET, session = id, "Run {}", other.as_str()),
            },
            TaskEvent::Error { message } => {
                error!(target: MIRROR_TARGET, session = id, "{}", message);
            }
        }
    }

    fn write_output(&self, text: &str) {
        trace!(target: MIRROR_TARGET, session = self.session_id.as_str(), "{}", text);
    }
}
