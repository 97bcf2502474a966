//! State shared by the step callbacks and the stream consumer during one run.

use crate::capability::{StepCallbacks, StepFinish, Surface};
use crate::event_sink::{EventSink, TaskEvent};
use crate::overlay::{EffectHandle, EffectOutcome, ReasoningOverlay, ReasoningSubtitle};
use crate::reasoning::{extract_reasoning, normalize_reasoning};
use crate::step_policy::{StepContext, StepPolicyEnforcer};
use crate::thoughts::{ThoughtEntry, ThoughtLog, ThoughtSource};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub struct RunContext {
    policy: Mutex<StepPolicyEnforcer>,
    thoughts: Mutex<ThoughtLog>,
    sink: Arc<dyn EventSink>,
    subtitle: Arc<ReasoningSubtitle>,
}

impl RunContext {
    pub fn new(
        policy: StepPolicyEnforcer,
        sink: Arc<dyn EventSink>,
        reasoning: Arc<dyn ReasoningOverlay>,
        surface: Arc<dyn Surface>,
    ) -> Self {
        Self {
            policy: Mutex::new(policy),
            thoughts: Mutex::new(ThoughtLog::new()),
            sink,
            subtitle: ReasoningSubtitle::new(reasoning, surface),
        }
    }

    pub fn current_step(&self) -> u32 {
        self.policy.lock().step_number()
    }

    pub fn is_reasoning_tool(&self, tool_name: &str) -> bool {
        self.policy.lock().is_reasoning_tool(tool_name)
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Normalize, dedup and append a thought. On acceptance the sink is told
    /// and the reasoning overlay is refreshed in the background.
    pub fn accept_thought(
        &self,
        raw: &str,
        source: ThoughtSource,
    ) -> Option<(ThoughtEntry, EffectHandle)> {
        let entry = self.record_thought(raw, source)?;
        let effect = self.subtitle.update(entry.text.clone());
        Some((entry, effect))
    }

    /// Like [`RunContext::accept_thought`], but leaves the overlay alone
    pub fn record_thought(&self, raw: &str, source: ThoughtSource) -> Option<ThoughtEntry> {
        let normalized = normalize_reasoning(raw);
        let step = self.current_step();
        let entry = self.thoughts.lock().record(step, &normalized, source)?;

        debug!(
            "Thought accepted (step {}, {}): {}",
            step,
            source.as_str(),
            entry.text
        );
        self.sink.emit(TaskEvent::Think {
            step,
            text: entry.text.clone(),
            source,
        });
        Some(entry)
    }

    /// Blank the reasoning overlay; no later thought is shown on it
    pub async fn clear_reasoning(&self) -> EffectOutcome {
        self.subtitle.clear().await
    }

    pub fn emit_action(&self, tool_name: &str, args: Value) {
        self.sink.emit(TaskEvent::Action {
            step: self.current_step(),
            tool_name: tool_name.to_string(),
            args,
        });
    }

    pub fn thoughts(&self) -> Vec<ThoughtEntry> {
        self.thoughts.lock().entries().to_vec()
    }
}

/// Adapter handed to the engine as its step callbacks
pub struct StepHooks {
    context: Arc<RunContext>,
}

impl StepHooks {
    pub fn new(context: Arc<RunContext>) -> Self {
        Self { context }
    }
}

impl StepCallbacks for StepHooks {
    fn prepare_step(&self, context: StepContext) -> StepContext {
        self.context.policy.lock().prepare_step(context)
    }

    fn on_step_finish(&self, step: StepFinish) {
        self.context.policy.lock().record_step(&step.tool_calls);

        for call in step.tool_calls {
            if self.context.is_reasoning_tool(&call.tool_name) {
                match extract_reasoning(Some(&call.args), None) {
                    Some(text) => {
                        // Overlay refresh is fire-and-forget here
                        let _ = self.context.accept_thought(&text, ThoughtSource::StepFinish);
                    }
                    None => debug!("Reasoning call without payload at step finish"),
                }
            } else {
                self.context.emit_action(&call.tool_name, call.args);
            }
        }
    }
}
