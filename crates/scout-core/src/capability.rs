//! The browser-automation capability consumed by the orchestrator.
//!
//! The engine itself lives outside this crate. These traits describe the
//! shape it has to expose: a controllable surface, an agent that executes an
//! instruction and yields two independent streams plus a final result, and
//! the step callbacks the engine invokes between agent steps.

use crate::step_policy::StepContext;
use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use scout_config::Environment;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A page (tab) the engine lets us drive directly
#[async_trait]
pub trait Surface: Send + Sync {
    /// Navigate to a URL
    async fn goto(&self, url: &str) -> Result<()>;

    /// Evaluate a script in the page. `args` are exposed to the script as `arguments`.
    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value>;
}

/// Launch parameters resolved by the orchestrator before the engine boots
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSettings {
    pub environment: Environment,
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub headless: bool,
    pub verbose: u8,
    pub model: String,
}

#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    /// Connect/bootstrap the engine
    async fn init(&mut self, settings: &LaunchSettings) -> Result<()>;

    /// The first controllable surface, if the engine has one open
    async fn surface(&self) -> Result<Option<Arc<dyn Surface>>>;

    /// Build a streaming agent bound to this engine
    fn agent(&self, options: AgentOptions) -> Result<Box<dyn TaskAgent>>;

    /// Release the engine
    async fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOptions {
    pub mode: String,
    pub model: String,
    pub stream: bool,
    pub system_prompt: Option<String>,
}

#[async_trait]
pub trait TaskAgent: Send + Sync {
    async fn execute(&self, request: ExecuteRequest) -> Result<AgentRun>;
}

/// Hooks the engine calls around every agent step
pub trait StepCallbacks: Send + Sync {
    /// Called before each step; the returned context is what the model sees
    fn prepare_step(&self, context: StepContext) -> StepContext;

    /// Called after each step with the tool calls it made
    fn on_step_finish(&self, step: StepFinish);
}

pub struct ExecuteRequest {
    pub instruction: String,
    pub max_steps: u32,
    pub callbacks: Arc<dyn StepCallbacks>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(tool_name: &str, args: Value) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            args,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepFinish {
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Structured event on the engine's full stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentEvent {
    ToolCall {
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(default)]
        args: Option<Value>,
        #[serde(default)]
        input: Option<Value>,
    },
    ToolResult {
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(default)]
        result: Option<Value>,
    },
    /// Any other event type the engine emits (text parts, step markers, ...)
    #[serde(other)]
    Other,
}

impl AgentEvent {
    /// Decode an event from the engine's raw JSON shape
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// A single action reported in the final result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub actions: Vec<FinalAction>,
}

impl FinalResult {
    /// Reasoning attached to the terminal `close` action, when non-blank
    pub fn close_reasoning(&self) -> Option<&str> {
        self.actions
            .iter()
            .rev()
            .find(|action| action.action_type.eq_ignore_ascii_case("close"))
            .and_then(|action| action.reasoning.as_deref())
            .filter(|reasoning| !reasoning.trim().is_empty())
    }
}

/// What `TaskAgent::execute` hands back: two independently paced streams and
/// the final result, which settles once the engine is done
pub struct AgentRun {
    pub full_stream: BoxStream<'static, Result<AgentEvent>>,
    pub text_stream: BoxStream<'static, String>,
    pub result: BoxFuture<'static, Result<FinalResult>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_agent_event_decoding() {
        let event = AgentEvent::from_value(json!({
            "type": "tool-call",
            "toolName": "think",
            "args": {"thought": "hi"}
        }))
        .unwrap();
        assert_eq!(
            event,
            AgentEvent::ToolCall {
                tool_name: "think".to_string(),
                args: Some(json!({"thought": "hi"})),
                input: None,
            }
        );

        let result = AgentEvent::from_value(json!({
            "type": "tool-result",
            "toolName": "think",
            "result": "ok"
        }))
        .unwrap();
        assert!(matches!(result, AgentEvent::ToolResult { .. }));

        let other = AgentEvent::from_value(json!({"type": "text-delta", "text": "x"})).unwrap();
        assert_eq!(other, AgentEvent::Other);

        assert!(AgentEvent::from_value(json!({"toolName": "no type"})).is_err());
    }

    #[test]
    fn test_close_reasoning() {
        let result = FinalResult {
            success: true,
            message: None,
            actions: vec![
                FinalAction {
                    action_type: "click".to_string(),
                    reasoning: Some("ignored".to_string()),
                },
                FinalAction {
                    action_type: "close".to_string(),
                    reasoning: Some("All done".to_string()),
                },
            ],
        };
        assert_eq!(result.close_reasoning(), Some("All done"));

        let blank = FinalResult {
            success: true,
            message: None,
            actions: vec![FinalAction {
                action_type: "close".to_string(),
                reasoning: Some("   ".to_string()),
            }],
        };
        assert_eq!(blank.close_reasoning(), None);
    }
}
