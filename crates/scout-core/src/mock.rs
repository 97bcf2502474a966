//! Scripted browser engine for testing
//!
//! Replays a fixed list of agent steps against the orchestrator. Each step
//! runs `prepare_step`, pushes its stream items and text deltas through
//! channels, then reports its tool calls through `on_step_finish`. Every
//! page call and engine lifecycle call is recorded for assertions.
//!
//! # Example
//!
//! ```rust,ignore
//! use scout_core::mock::{MockBrowser, MockStep};
//!
//! let browser = MockBrowser::new()
//!     .with_step(MockStep::new().with_call("think", json!({"thought": "Looking around"})))
//!     .with_step(MockStep::new().with_call("click", json!({"selector": "#menu"})))
//!     .with_result(FinalResult { success: true, ..Default::default() });
//! let probe = browser.probe();
//! ```

use crate::capability::{
    AgentEvent, AgentOptions, AgentRun, BrowserAutomation, ExecuteRequest, FinalResult,
    LaunchSettings, StepFinish, Surface, TaskAgent, ToolCall,
};
use crate::event_sink::{EventSink, TaskEvent};
use crate::overlay::{AnalyticsOverlay, OverlayOptions, Overlays, ReasoningOverlay, TimerOverlay};
use crate::step_policy::StepContext;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Goto(String),
    Evaluate { script: String, args: Vec<Value> },
}

/// Page that records what was asked of it
#[derive(Default)]
pub struct MockSurface {
    calls: Mutex<Vec<SurfaceCall>>,
    fail_evaluate: bool,
    slow_script: Option<(String, Duration)>,
}

impl MockSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `evaluate` call fails
    pub fn failing_evaluate(mut self) -> Self {
        self.fail_evaluate = true;
        self
    }

    /// `evaluate` sleeps first whenever the script contains `marker`
    pub fn with_slow_script(mut self, marker: &str, delay: Duration) -> Self {
        self.slow_script = Some((marker.to_string(), delay));
        self
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SurfaceCall::Goto(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn evaluations(&self) -> Vec<(String, Vec<Value>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SurfaceCall::Evaluate { script, args } => Some((script.clone(), args.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Surface for MockSurface {
    async fn goto(&self, url: &str) -> Result<()> {
        self.calls.lock().push(SurfaceCall::Goto(url.to_string()));
        Ok(())
    }

    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.calls.lock().push(SurfaceCall::Evaluate {
            script: script.to_string(),
            args,
        });
        if let Some((marker, delay)) = &self.slow_script {
            if script.contains(marker.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }
        if self.fail_evaluate {
            bail!("page evaluation failed");
        }
        Ok(Value::Bool(true))
    }
}

/// An item on the scripted structured stream
#[derive(Debug, Clone)]
pub enum MockStreamItem {
    Event(AgentEvent),
    /// Delivered as a stream error
    Malformed(String),
}

/// One scripted agent step
#[derive(Debug, Clone, Default)]
pub struct MockStep {
    pub tool_calls: Vec<ToolCall>,
    pub stream: Vec<MockStreamItem>,
    pub text_deltas: Vec<String>,
}

impl MockStep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tool call reported through `on_step_finish`
    pub fn with_call(mut self, tool_name: &str, args: Value) -> Self {
        self.tool_calls.push(ToolCall::new(tool_name, args));
        self
    }

    pub fn with_event(mut self, event: AgentEvent) -> Self {
        self.stream.push(MockStreamItem::Event(event));
        self
    }

    pub fn with_malformed(mut self, reason: &str) -> Self {
        self.stream.push(MockStreamItem::Malformed(reason.to_string()));
        self
    }

    pub fn with_text(mut self, delta: &str) -> Self {
        self.text_deltas.push(delta.to_string());
        self
    }
}

/// What the engine was asked to do, shared with the test
#[derive(Debug, Default)]
struct ProbeState {
    launches: Vec<LaunchSettings>,
    close_calls: usize,
    agent_options: Vec<AgentOptions>,
    prepared: Vec<StepContext>,
}

#[derive(Clone, Default)]
pub struct MockProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl MockProbe {
    pub fn launches(&self) -> Vec<LaunchSettings> {
        self.state.lock().launches.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }

    pub fn agent_options(&self) -> Vec<AgentOptions> {
        self.state.lock().agent_options.clone()
    }

    /// Step contexts as returned by `prepare_step`
    pub fn prepared_steps(&self) -> Vec<StepContext> {
        self.state.lock().prepared.clone()
    }
}

pub struct MockBrowser {
    surface: Option<Arc<MockSurface>>,
    steps: Vec<MockStep>,
    result: FinalResult,
    result_error: Option<String>,
    probe: MockProbe,
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrowser {
    pub fn new() -> Self {
        Self {
            surface: Some(Arc::new(MockSurface::new())),
            steps: Vec::new(),
            result: FinalResult {
                success: true,
                message: Some("done".to_string()),
                actions: Vec::new(),
            },
            result_error: None,
            probe: MockProbe::default(),
        }
    }

    pub fn with_surface(mut self, surface: Arc<MockSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Engine that never opens a page
    pub fn without_surface(mut self) -> Self {
        self.surface = None;
        self
    }

    pub fn with_step(mut self, step: MockStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_result(mut self, result: FinalResult) -> Self {
        self.result = result;
        self
    }

    /// The final result future resolves to this error
    pub fn with_result_error(mut self, message: &str) -> Self {
        self.result_error = Some(message.to_string());
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }

    pub fn surface_handle(&self) -> Option<Arc<MockSurface>> {
        self.surface.clone()
    }
}

#[async_trait]
impl BrowserAutomation for MockBrowser {
    async fn init(&mut self, settings: &LaunchSettings) -> Result<()> {
        self.probe.state.lock().launches.push(settings.clone());
        Ok(())
    }

    async fn surface(&self) -> Result<Option<Arc<dyn Surface>>> {
        Ok(self.surface.clone().map(|surface| surface as Arc<dyn Surface>))
    }

    fn agent(&self, options: AgentOptions) -> Result<Box<dyn TaskAgent>> {
        self.probe.state.lock().agent_options.push(options);
        Ok(Box::new(MockAgent {
            steps: self.steps.clone(),
            result: self.result.clone(),
            result_error: self.result_error.clone(),
            probe: self.probe.clone(),
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.probe.state.lock().close_calls += 1;
        Ok(())
    }
}

pub struct MockAgent {
    steps: Vec<MockStep>,
    result: FinalResult,
    result_error: Option<String>,
    probe: MockProbe,
}

#[async_trait]
impl TaskAgent for MockAgent {
    async fn execute(&self, request: ExecuteRequest) -> Result<AgentRun> {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (text_tx, text_rx) = mpsc::channel(64);
        let (result_tx, result_rx) = oneshot::channel();

        let steps: Vec<MockStep> = self
            .steps
            .iter()
            .take(request.max_steps as usize)
            .cloned()
            .collect();
        let outcome = match &self.result_error {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(self.result.clone()),
        };
        let probe = self.probe.clone();
        let callbacks = request.callbacks;

        tokio::spawn(async move {
            for (index, step) in steps.into_iter().enumerate() {
                let context = callbacks.prepare_step(StepContext::new(index as u32 + 1));
                probe.state.lock().prepared.push(context);

                for item in step.stream {
                    let item = match item {
                        MockStreamItem::Event(event) => Ok(event),
                        MockStreamItem::Malformed(reason) => Err(anyhow!(reason)),
                    };
                    if event_tx.send(item).await.is_err() {
                        break;
                    }
                }
                for delta in step.text_deltas {
                    if text_tx.send(delta).await.is_err() {
                        break;
                    }
                }

                callbacks.on_step_finish(StepFinish {
                    tool_calls: step.tool_calls,
                    text: None,
                });
            }
            drop(event_tx);
            drop(text_tx);
            let _ = result_tx.send(outcome);
        });

        Ok(AgentRun {
            full_stream: Box::pin(ReceiverStream::new(event_rx)),
            text_stream: Box::pin(ReceiverStream::new(text_rx)),
            result: Box::pin(async move {
                result_rx
                    .await
                    .map_err(|_| anyhow!("mock agent dropped its result"))?
            }),
        })
    }
}

/// Sink that keeps everything it is given
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TaskEvent>>,
    output: Mutex<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().clone()
    }

    /// Tool names of every action event, in order
    pub fn actions(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                TaskEvent::Action { tool_name, .. } => Some(tool_name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn output(&self) -> String {
        self.output.lock().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: TaskEvent) {
        self.events.lock().push(event);
    }

    fn write_output(&self, text: &str) {
        self.output.lock().push_str(text);
    }
}

/// Overlay standing in for all three slots, recording calls by name
#[derive(Default)]
pub struct RecordingOverlay {
    calls: Mutex<Vec<String>>,
    failing: bool,
}

impl RecordingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call is recorded and then fails
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Install this overlay in every slot
    pub fn overlays(self: &Arc<Self>) -> Overlays {
        Overlays {
            timer: self.clone(),
            analytics: self.clone(),
            reasoning: self.clone(),
        }
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().push(call.clone());
        if self.failing {
            bail!("{} failed", call);
        }
        Ok(())
    }
}

#[async_trait]
impl TimerOverlay for RecordingOverlay {
    async fn inject(&self, _surface: &dyn Surface, _options: &OverlayOptions) -> Result<()> {
        self.record("timer.inject".to_string())
    }
    async fn stop(&self, _surface: &dyn Surface) -> Result<()> {
        self.record("timer.stop".to_string())
    }
    async fn remove(&self, _surface: &dyn Surface) -> Result<()> {
        self.record("timer.remove".to_string())
    }
}

#[async_trait]
impl AnalyticsOverlay for RecordingOverlay {
    async fn inject(&self, _surface: &dyn Surface, _options: &OverlayOptions) -> Result<()> {
        self.record("analytics.inject".to_string())
    }
    async fn show(&self, _surface: &dyn Surface, event_name: &str, _props: Value) -> Result<()> {
        self.record(format!("analytics.show:{}", event_name))
    }
    async fn remove(&self, _surface: &dyn Surface) -> Result<()> {
        self.record("analytics.remove".to_string())
    }
}

#[async_trait]
impl ReasoningOverlay for RecordingOverlay {
    async fn inject(&self, _surface: &dyn Surface, _options: &OverlayOptions) -> Result<()> {
        self.record("reasoning.inject".to_string())
    }
    async fn update(&self, _surface: &dyn Surface, text: &str) -> Result<()> {
        self.record(format!("reasoning.update:{}", text))
    }
    async fn remove(&self, _surface: &dyn Surface) -> Result<()> {
        self.record("reasoning.remove".to_string())
    }
}
