//! Task execution orchestrator.
//!
//! Drives one run end to end: boots the browser engine, points the first
//! page at the target site, decorates it with the overlays, hands the
//! instruction to a streaming agent and collects its narrated reasoning into
//! a deduplicated thought list. Only configuration problems stop a run early;
//! cosmetic and telemetry failures are logged and ignored.
//!
//! ```text
//! Uninitialized --init--> Initialized --execute--> Running --> Completed | Error
//!        any state after init --close--> Closed
//! ```

use crate::capability::{
    AgentOptions, AgentRun, BrowserAutomation, ExecuteRequest, FinalResult, LaunchSettings, Surface,
};
use crate::error::OrchestratorError;
use crate::event_sink::{EventSink, RunStatus, TaskEvent, TracingEventSink};
use crate::overlay::{best_effort, OverlayOptions, Overlays};
use crate::reasoning::sanitize_final_message;
use crate::run_context::{RunContext, StepHooks};
use crate::step_policy::StepPolicyEnforcer;
use crate::stream_consumer::consume_streams;
use crate::task_config::TaskConfig;
use crate::thoughts::{ThoughtEntry, ThoughtSource};
use anyhow::{Context, Result};
use scout_config::{Environment, API_KEY_ENV, PROJECT_ID_ENV};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Publishes the task id where in-page observers look for it
const TASK_IDENTITY_SCRIPT: &str = r#"
const [taskId] = arguments;
try { window.localStorage.setItem("scout_task_id", taskId); } catch (e) {}
window.__SCOUT_TASK_ID__ = taskId;
return true;
"#;

/// Reports the end of a session through the page's own tracking hook, or a
/// keepalive request when only an endpoint is known
const SESSION_ENDED_SCRIPT: &str = r#"
const [payload] = arguments;
if (typeof window.__scoutTrack === "function") {
  window.__scoutTrack(payload.event, payload);
  return "hook";
}
if (payload.endpoint) {
  return fetch(payload.endpoint, {
    method: "POST",
    keepalive: true,
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify(payload),
  }).then(() => "fetch");
}
return "skipped";
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorState {
    Uninitialized,
    Initialized,
    Running,
    Completed,
    Error,
    Closed,
}

impl OrchestratorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorState::Uninitialized => "uninitialized",
            OrchestratorState::Initialized => "initialized",
            OrchestratorState::Running => "running",
            OrchestratorState::Completed => "completed",
            OrchestratorState::Error => "error",
            OrchestratorState::Closed => "closed",
        }
    }
}

/// What a finished run hands back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub task_id: String,
    pub thoughts: Vec<ThoughtEntry>,
    pub result: FinalResult,
    /// Number of steps the agent prepared
    pub steps: u32,
}

pub struct TaskOrchestrator {
    config: TaskConfig,
    task_id: String,
    browser: Box<dyn BrowserAutomation>,
    overlays: Overlays,
    sink: Arc<dyn EventSink>,
    state: OrchestratorState,
    surface: Option<Arc<dyn Surface>>,
    started_at: Option<Instant>,
    timer_running: bool,
    browser_closed: bool,
}

impl TaskOrchestrator {
    pub fn new(config: TaskConfig, browser: Box<dyn BrowserAutomation>) -> Self {
        let task_id = config
            .task_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            config,
            task_id,
            browser,
            overlays: Overlays::default(),
            sink: Arc::new(TracingEventSink),
            state: OrchestratorState::Uninitialized,
            surface: None,
            started_at: None,
            timer_running: false,
            browser_closed: false,
        }
    }

    pub fn with_overlays(mut self, overlays: Overlays) -> Self {
        self.overlays = overlays;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Resolve launch settings and boot the engine.
    ///
    /// The remote environment needs both an API key and a project id, taken
    /// from the task config first and the environment second. Either one
    /// missing fails with [`OrchestratorError::MissingCredential`] before the
    /// engine is touched.
    pub async fn init(&mut self) -> Result<()> {
        if self.state != OrchestratorState::Uninitialized {
            return Err(OrchestratorError::InvalidState {
                operation: "init",
                state: self.state.as_str(),
            }
            .into());
        }

        let settings = resolve_launch_settings(&self.config)?;
        info!(
            "Initializing browser engine ({:?}, model {})",
            settings.environment, settings.model
        );
        self.browser
            .init(&settings)
            .await
            .context("Failed to initialize browser engine")?;

        self.state = OrchestratorState::Initialized;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Run the task to completion and return the collected thoughts
    pub async fn execute(&mut self) -> Result<TaskRun> {
        match self.state {
            OrchestratorState::Initialized => {}
            OrchestratorState::Uninitialized => {
                return Err(OrchestratorError::NotInitialized.into())
            }
            other => {
                return Err(OrchestratorError::InvalidState {
                    operation: "execute",
                    state: other.as_str(),
                }
                .into())
            }
        }

        self.state = OrchestratorState::Running;
        match self.run_task().await {
            Ok(run) => {
                self.state = OrchestratorState::Completed;
                self.sink.emit(TaskEvent::Status {
                    status: RunStatus::Completed,
                });
                info!(
                    "Task {} finished after {} steps with {} thoughts",
                    self.task_id,
                    run.steps,
                    run.thoughts.len()
                );
                Ok(run)
            }
            Err(e) => {
                self.state = OrchestratorState::Error;
                self.stop_timer().await;
                self.sink.emit(TaskEvent::Error {
                    message: format!("{:#}", e),
                });
                self.sink.emit(TaskEvent::Status {
                    status: RunStatus::Error,
                });
                Err(e)
            }
        }
    }

    async fn run_task(&mut self) -> Result<TaskRun> {
        let surface = self
            .browser
            .surface()
            .await
            .context("Failed to obtain a browser page")?
            .ok_or(OrchestratorError::NoSurface)?;
        self.surface = Some(surface.clone());

        surface
            .goto(&self.config.website)
            .await
            .with_context(|| format!("Failed to navigate to {}", self.config.website))?;

        self.publish_task_identity(surface.as_ref()).await;
        self.inject_overlays(surface.as_ref()).await;

        self.sink.emit(TaskEvent::Status {
            status: RunStatus::Running,
        });

        let context = Arc::new(RunContext::new(
            StepPolicyEnforcer::new(),
            self.sink.clone(),
            self.overlays.reasoning.clone(),
            surface.clone(),
        ));

        let agent = self
            .browser
            .agent(AgentOptions {
                mode: self.config.mode.clone(),
                model: self.config.model.clone(),
                stream: true,
                system_prompt: self.config.system_prompt.clone(),
            })
            .context("Failed to create agent")?;

        info!("Executing task: {}", self.config.instruction);
        let AgentRun {
            full_stream,
            text_stream,
            result,
        } = agent
            .execute(ExecuteRequest {
                instruction: self.config.instruction.clone(),
                max_steps: self.config.max_steps,
                callbacks: Arc::new(StepHooks::new(context.clone())),
            })
            .await
            .context("Agent failed to start")?;

        consume_streams(&context, full_stream, text_stream).await;

        let mut result = result.await.context("Agent run failed")?;

        self.stop_timer().await;
        context.clear_reasoning().await;
        best_effort(
            "Analytics notification",
            self.overlays.analytics.show(
                surface.as_ref(),
                "task_finished",
                json!({ "taskId": self.task_id, "success": result.success }),
            ),
        )
        .await;

        result.message = Some(sanitize_final_message(result.message.as_deref(), result.success));

        if let Some(reasoning) = result.close_reasoning().map(str::to_string) {
            if let Some(entry) = context.record_thought(&reasoning, ThoughtSource::FinalReasoning) {
                debug!("Final reasoning recorded: {}", entry.text);
            }
        }

        Ok(TaskRun {
            task_id: self.task_id.clone(),
            thoughts: context.thoughts(),
            result,
            steps: context.current_step(),
        })
    }

    async fn publish_task_identity(&self, surface: &dyn Surface) {
        best_effort("Task identity publish", async {
            surface
                .evaluate(TASK_IDENTITY_SCRIPT, vec![json!(self.task_id)])
                .await
                .map(|_| ())
        })
        .await;
    }

    async fn inject_overlays(&mut self, surface: &dyn Surface) {
        let options = OverlayOptions {
            task_id: self.task_id.clone(),
            label: Some(self.config.instruction.clone()),
        };

        best_effort("Timer overlay inject", self.overlays.timer.inject(surface, &options)).await;
        self.timer_running = true;
        best_effort(
            "Analytics overlay inject",
            self.overlays.analytics.inject(surface, &options),
        )
        .await;
        best_effort(
            "Reasoning overlay inject",
            self.overlays.reasoning.inject(surface, &options),
        )
        .await;
    }

    async fn stop_timer(&mut self) {
        let Some(surface) = self.surface.clone() else {
            return;
        };
        if !self.timer_running {
            return;
        }
        self.timer_running = false;
        best_effort("Timer overlay stop", self.overlays.timer.stop(surface.as_ref())).await;
    }

    /// Tear the run down. Never fails: every step is attempted and problems
    /// are only logged. A second call skips releasing the engine but still
    /// reports the session end.
    pub async fn close(&mut self) {
        if self.state == OrchestratorState::Uninitialized {
            debug!("close() called before init(); nothing to release");
            return;
        }

        if let Some(surface) = self.surface.clone() {
            self.send_session_ended(surface.as_ref()).await;

            best_effort(
                "Analytics overlay remove",
                self.overlays.analytics.remove(surface.as_ref()),
            )
            .await;
            best_effort(
                "Reasoning overlay remove",
                self.overlays.reasoning.remove(surface.as_ref()),
            )
            .await;
        }

        if !self.browser_closed {
            self.browser_closed = true;
            if let Err(e) = self.browser.close().await {
                warn!("Failed to close browser engine: {:#}", e);
            }
        }

        self.state = OrchestratorState::Closed;
    }

    async fn send_session_ended(&self, surface: &dyn Surface) {
        let duration_ms = self
            .started_at
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let payload = json!({
            "event": "session_ended",
            "taskId": self.task_id,
            "durationMs": duration_ms,
            "endpoint": self.config.telemetry_endpoint,
        });

        let limit = Duration::from_millis(self.config.close_timeout_ms);
        let report = surface.evaluate(SESSION_ENDED_SCRIPT, vec![payload]);
        match tokio::time::timeout(limit, report).await {
            Ok(Ok(channel)) => debug!("Session-ended telemetry sent via {}", channel),
            Ok(Err(e)) => warn!("Session-ended telemetry failed: {:#}", e),
            Err(_) => debug!("Session-ended telemetry timed out after {:?}", limit),
        }
    }
}

fn resolve_launch_settings(config: &TaskConfig) -> Result<LaunchSettings, OrchestratorError> {
    let api_key = credential(config.credentials.api_key.as_deref(), API_KEY_ENV);
    let project_id = credential(config.credentials.project_id.as_deref(), PROJECT_ID_ENV);

    if config.environment == Environment::Remote {
        if api_key.is_none() {
            return Err(OrchestratorError::MissingCredential {
                what: "API key",
                env_var: API_KEY_ENV,
            });
        }
        if project_id.is_none() {
            return Err(OrchestratorError::MissingCredential {
                what: "project id",
                env_var: PROJECT_ID_ENV,
            });
        }
    }

    Ok(LaunchSettings {
        environment: config.environment,
        api_key,
        project_id,
        headless: config.headless,
        verbose: config.verbose,
        model: config.model.clone(),
    })
}

/// Explicit value first, then the environment. Blank counts as missing.
fn credential(explicit: Option<&str>, env_var: &str) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
}
