//! "Explain before act" policy applied at step boundaries.
//!
//! Every step after the first must open with a call to the reasoning tool
//! unless the previous step already consisted of nothing but reasoning.

use crate::capability::ToolCall;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name of the tool the agent narrates its reasoning with
pub const REASONING_TOOL: &str = "think";

pub const THINK_FIRST_INSTRUCTION: &str = "Before taking any other action in this step, \
call the `think` tool to explain what you observe on the page and what you are about to do next. \
Do not call any other tool until you have done so.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMessage {
    pub role: MessageRole,
    pub content: String,
}

impl StepMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// What the model will see for the upcoming step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    /// Step number as reported by the engine (informational)
    pub step_number: u32,
    pub messages: Vec<StepMessage>,
}

impl StepContext {
    pub fn new(step_number: u32) -> Self {
        Self {
            step_number,
            messages: Vec::new(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<StepMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn has_think_instruction(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.content == THINK_FIRST_INSTRUCTION)
    }
}

#[derive(Debug)]
pub struct StepPolicyEnforcer {
    reasoning_tool: String,
    last_step_tool_calls: Vec<ToolCall>,
    last_step_had_think: bool,
    /// Incremented at the start of every `prepare_step`; authoritative step counter
    step_number: u32,
}

impl Default for StepPolicyEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

impl StepPolicyEnforcer {
    pub fn new() -> Self {
        Self::with_reasoning_tool(REASONING_TOOL)
    }

    pub fn with_reasoning_tool(tool: &str) -> Self {
        Self {
            reasoning_tool: tool.to_string(),
            last_step_tool_calls: Vec::new(),
            last_step_had_think: false,
            step_number: 0,
        }
    }

    pub fn step_number(&self) -> u32 {
        self.step_number
    }

    pub fn reasoning_tool(&self) -> &str {
        &self.reasoning_tool
    }

    pub fn is_reasoning_tool(&self, tool_name: &str) -> bool {
        tool_name == self.reasoning_tool
    }

    /// Advance the step counter and, when the previous step skipped reasoning
    /// or mixed it with other actions, append the think-first instruction.
    pub fn prepare_step(&mut self, mut context: StepContext) -> StepContext {
        self.step_number += 1;

        if self.step_number == 1 {
            return context;
        }

        if self.needs_forced_think() {
            debug!(
                "Step {}: previous step ({} tool calls, think={}) requires a think-first prompt",
                self.step_number,
                self.last_step_tool_calls.len(),
                self.last_step_had_think
            );
            context
                .messages
                .push(StepMessage::new(MessageRole::User, THINK_FIRST_INSTRUCTION));
        }
        context
    }

    /// Remember what the step that just finished did
    pub fn record_step(&mut self, tool_calls: &[ToolCall]) {
        self.last_step_had_think = tool_calls
            .iter()
            .any(|call| self.is_reasoning_tool(&call.tool_name));
        self.last_step_tool_calls = tool_calls.to_vec();
    }

    fn needs_forced_think(&self) -> bool {
        let had_other_tool = self
            .last_step_tool_calls
            .iter()
            .any(|call| !self.is_reasoning_tool(&call.tool_name));
        !self.last_step_had_think || had_other_tool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn think() -> ToolCall {
        ToolCall::new(REASONING_TOOL, json!({"thought": "looking"}))
    }

    fn click() -> ToolCall {
        ToolCall::new("click", json!({"selector": "#menu"}))
    }

    fn base_context(step: u32) -> StepContext {
        StepContext::new(step)
            .with_messages(vec![StepMessage::new(MessageRole::User, "Find pricing")])
    }

    #[test]
    fn test_first_step_is_exempt() {
        let mut enforcer = StepPolicyEnforcer::new();
        let context = base_context(0);
        assert_eq!(enforcer.prepare_step(context.clone()), context);
        assert_eq!(enforcer.step_number(), 1);
    }

    #[test]
    fn test_think_only_step_passes_through() {
        let mut enforcer = StepPolicyEnforcer::new();
        enforcer.prepare_step(base_context(0));
        enforcer.record_step(&[think()]);

        let context = base_context(1);
        assert_eq!(enforcer.prepare_step(context.clone()), context);
        assert_eq!(enforcer.step_number(), 2);
    }

    #[test]
    fn test_non_think_step_forces_instruction() {
        let mut enforcer = StepPolicyEnforcer::new();
        enforcer.prepare_step(base_context(0));
        enforcer.record_step(&[click()]);

        let prepared = enforcer.prepare_step(base_context(1));
        assert!(prepared.has_think_instruction());
        assert_eq!(prepared.messages.len(), 2);
    }

    #[test]
    fn test_mixed_step_forces_instruction() {
        let mut enforcer = StepPolicyEnforcer::new();
        enforcer.prepare_step(base_context(0));
        enforcer.record_step(&[think(), click()]);
        assert!(enforcer.prepare_step(base_context(1)).has_think_instruction());
    }

    #[test]
    fn test_empty_step_forces_instruction() {
        let mut enforcer = StepPolicyEnforcer::new();
        enforcer.prepare_step(base_context(0));
        enforcer.record_step(&[]);
        assert!(enforcer.prepare_step(base_context(1)).has_think_instruction());
    }

    #[test]
    fn test_custom_reasoning_tool() {
        let mut enforcer = StepPolicyEnforcer::with_reasoning_tool("reflect");
        enforcer.prepare_step(StepContext::new(0));
        enforcer.record_step(&[ToolCall::new("reflect", json!("hmm"))]);
        assert!(!enforcer.prepare_step(StepContext::new(1)).has_think_instruction());
        enforcer.record_step(&[think()]);
        assert!(enforcer.prepare_step(StepContext::new(2)).has_think_instruction());
    }
}
