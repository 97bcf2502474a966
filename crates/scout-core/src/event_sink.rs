use crate::thoughts::ThoughtSource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of a single orchestrator run as reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }
}

/// Structured notification emitted by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskEvent {
    Think {
        step: u32,
        text: String,
        source: ThoughtSource,
    },
    Action {
        step: u32,
        tool_name: String,
        args: Value,
    },
    Status {
        status: RunStatus,
    },
    Error {
        message: String,
    },
}

/// Destination for everything the orchestrator wants observers to see.
/// The orchestrator owns one of these instead of writing to process output,
/// so implementations decide whether and how to mirror events elsewhere.
pub trait EventSink: Send + Sync {
    /// Record a structured event
    fn emit(&self, event: TaskEvent);

    /// Incidental free-text output (streamed model text). Default discards it.
    fn write_output(&self, _text: &str) {}
}

/// A no-op implementation for when no one is listening
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: TaskEvent) {}
}

/// Mirrors events to `tracing`, for running without a session registry
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: TaskEvent) {
        match event {
            TaskEvent::Think { step, text, .. } => {
                tracing::info!("💭 Thinking: [step {}] {}", step, text)
            }
            TaskEvent::Action {
                tool_name, args, ..
            } => tracing::info!("⚡ Action: {} {}", tool_name, args),
            TaskEvent::Status { status } => tracing::info!("Status: {}", status.as_str()),
            TaskEvent::Error { message } => tracing::error!("{}", message),
        }
    }

    fn write_output(&self, text: &str) {
        tracing::trace!("{}", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization_shape() {
        let event = TaskEvent::Action {
            step: 2,
            tool_name: "click".to_string(),
            args: json!({"selector": "#buy"}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "action");
        assert_eq!(value["tool_name"], "click");

        let status = serde_json::to_value(TaskEvent::Status {
            status: RunStatus::Running,
        })
        .unwrap();
        assert_eq!(status, json!({"kind": "status", "status": "running"}));
    }
}
