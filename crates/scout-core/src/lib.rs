pub mod capability;
pub mod error;
pub mod event_sink;
pub mod orchestrator;
pub mod overlay;
pub mod reasoning;
pub mod run_context;
pub mod step_policy;
pub mod stream_consumer;
pub mod task_config;
pub mod thoughts;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;


pub use capability::{
    AgentEvent, AgentOptions, AgentRun, BrowserAutomation, ExecuteRequest, FinalAction, FinalResult,
    LaunchSettings, StepCallbacks, StepFinish, Surface, TaskAgent, ToolCall,
};
pub use error::OrchestratorError;
pub use event_sink::{EventSink, NullEventSink, RunStatus, TaskEvent, TracingEventSink};
pub use orchestrator::{OrchestratorState, TaskOrchestrator, TaskRun};
pub use overlay::{
    best_effort, EffectHandle, EffectOutcome, OverlayOptions, Overlays, ReasoningSubtitle,
};
pub use reasoning::{extract_reasoning, normalize_reasoning, sanitize_final_message};
pub use step_policy::{StepContext, StepPolicyEnforcer, REASONING_TOOL};
pub use stream_consumer::{consume_streams, StreamStats};
pub use task_config::{Credentials, TaskConfig};
pub use thoughts::{ThoughtDeduplicator, ThoughtEntry, ThoughtLog, ThoughtSource};
