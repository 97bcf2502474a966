//! Glue between one orchestrator run and its registry session.

use crate::capture::LogCapture;
use crate::registry::SessionRegistry;
use crate::sink::SessionSink;
use anyhow::Result;
use scout_core::{BrowserAutomation, Overlays, TaskConfig, TaskOrchestrator, TaskRun};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Run `orchestrator` on behalf of `session_id`.
///
/// Log output is captured into the session while the run lasts. The outcome
/// is recorded with `set_result` or `set_error`, and `close()` always runs.
/// Cancelling the session meanwhile keeps it `cancelled`; the run itself is
/// not interrupted.
pub async fn run_session(
    registry: &Arc<SessionRegistry>,
    capture: &LogCapture,
    session_id: &str,
    orchestrator: TaskOrchestrator,
) -> Result<TaskRun> {
    let guard = match capture.start_logging(session_id) {
        Ok(guard) => Some(guard),
        Err(e) => {
            warn!("Running session {} without log capture: {}", session_id, e);
            None
        }
    };

    let sink = Arc::new(SessionSink::new(registry.clone(), session_id));
    let mut orchestrator = orchestrator.with_event_sink(sink);

    let outcome = drive(&mut orchestrator).await;
    match &outcome {
        Ok(run) => {
            info!("Session {} completed in {} steps", session_id, run.steps);
            registry.set_result(session_id, run);
        }
        Err(e) => registry.set_error(session_id, &format!("{:#}", e)),
    }

    orchestrator.close().await;
    if let Some(guard) = guard {
        capture.stop_logging(guard);
    }
    outcome
}

async fn drive(orchestrator: &mut TaskOrchestrator) -> Result<TaskRun> {
    orchestrator.init().await?;
    orchestrator.execute().await
}

/// Register a session for `config` and run it in the background
pub fn spawn_session(
    registry: &Arc<SessionRegistry>,
    capture: &LogCapture,
    config: TaskConfig,
    browser: Box<dyn BrowserAutomation>,
    overlays: Overlays,
) -> (String, JoinHandle<Result<TaskRun>>) {
    let session_id = registry.create(config.clone());
    let orchestrator = TaskOrchestrator::new(config, browser).with_overlays(overlays);

    let registry = registry.clone();
    let capture = capture.clone();
    let id = session_id.clone();
    let handle =
        tokio::spawn(async move { run_session(&registry, &capture, &id, orchestrator).await });

    (session_id, handle)
}
