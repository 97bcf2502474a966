//! In-page overlays and the best-effort contract for driving them.
//!
//! Overlays (elapsed-time badge, analytics toasts, reasoning subtitle) are
//! cosmetic. Every call into them goes through [`best_effort`] and yields an
//! [`EffectOutcome`] the caller may inspect or drop; a failing overlay never
//! changes the outcome of a task.

use crate::capability::Surface;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayOptions {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[async_trait]
pub trait TimerOverlay: Send + Sync {
    async fn inject(&self, surface: &dyn Surface, options: &OverlayOptions) -> Result<()>;
    async fn stop(&self, surface: &dyn Surface) -> Result<()>;
    async fn remove(&self, surface: &dyn Surface) -> Result<()>;
}

#[async_trait]
pub trait AnalyticsOverlay: Send + Sync {
    async fn inject(&self, surface: &dyn Surface, options: &OverlayOptions) -> Result<()>;
    async fn show(&self, surface: &dyn Surface, event_name: &str, props: Value) -> Result<()>;
    async fn remove(&self, surface: &dyn Surface) -> Result<()>;
}

#[async_trait]
pub trait ReasoningOverlay: Send + Sync {
    async fn inject(&self, surface: &dyn Surface, options: &OverlayOptions) -> Result<()>;
    async fn update(&self, surface: &dyn Surface, text: &str) -> Result<()>;
    async fn remove(&self, surface: &dyn Surface) -> Result<()>;
}

/// Overlay that does nothing; the default for every slot
pub struct NoopOverlay;

#[async_trait]
impl TimerOverlay for NoopOverlay {
    async fn inject(&self, _surface: &dyn Surface, _options: &OverlayOptions) -> Result<()> {
        Ok(())
    }
    async fn stop(&self, _surface: &dyn Surface) -> Result<()> {
        Ok(())
    }
    async fn remove(&self, _surface: &dyn Surface) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AnalyticsOverlay for NoopOverlay {
    async fn inject(&self, _surface: &dyn Surface, _options: &OverlayOptions) -> Result<()> {
        Ok(())
    }
    async fn show(&self, _surface: &dyn Surface, _event_name: &str, _props: Value) -> Result<()> {
        Ok(())
    }
    async fn remove(&self, _surface: &dyn Surface) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ReasoningOverlay for NoopOverlay {
    async fn inject(&self, _surface: &dyn Surface, _options: &OverlayOptions) -> Result<()> {
        Ok(())
    }
    async fn update(&self, _surface: &dyn Surface, _text: &str) -> Result<()> {
        Ok(())
    }
    async fn remove(&self, _surface: &dyn Surface) -> Result<()> {
        Ok(())
    }
}

/// The three overlay collaborators an orchestrator drives
#[derive(Clone)]
pub struct Overlays {
    pub timer: Arc<dyn TimerOverlay>,
    pub analytics: Arc<dyn AnalyticsOverlay>,
    pub reasoning: Arc<dyn ReasoningOverlay>,
}

impl Default for Overlays {
    fn default() -> Self {
        Self {
            timer: Arc::new(NoopOverlay),
            analytics: Arc::new(NoopOverlay),
            reasoning: Arc::new(NoopOverlay),
        }
    }
}

/// Result of a side effect nobody is obliged to check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectOutcome {
    Applied,
    Failed(String),
    /// The effect was never attempted: no runtime, or it was superseded
    Skipped,
}

impl EffectOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EffectOutcome::Applied)
    }
}

/// Run a cosmetic side effect, logging instead of propagating failure
pub async fn best_effort<F>(label: &str, effect: F) -> EffectOutcome
where
    F: Future<Output = Result<()>>,
{
    match effect.await {
        Ok(()) => EffectOutcome::Applied,
        Err(e) => {
            warn!("{} failed (ignored): {:#}", label, e);
            EffectOutcome::Failed(e.to_string())
        }
    }
}

/// A best-effort effect running in the background. Dropping the handle
/// detaches it; awaiting [`EffectHandle::outcome`] reports how it went.
pub struct EffectHandle {
    task: Option<JoinHandle<EffectOutcome>>,
}

impl EffectHandle {
    pub fn skipped() -> Self {
        Self { task: None }
    }

    pub async fn outcome(self) -> EffectOutcome {
        match self.task {
            Some(task) => task.await.unwrap_or_else(|e| {
                EffectOutcome::Failed(format!("effect task panicked: {}", e))
            }),
            None => EffectOutcome::Skipped,
        }
    }
}

#[derive(Default)]
struct SubtitleState {
    applied: u64,
    cleared: bool,
}

/// The reasoning overlay of one run.
///
/// Updates are spawned without waiting, but a write never replaces a newer
/// one: each update takes a sequence number when issued and is dropped if a
/// later one already landed. After [`ReasoningSubtitle::clear`] every
/// pending or future update is dropped.
pub struct ReasoningSubtitle {
    overlay: Arc<dyn ReasoningOverlay>,
    surface: Arc<dyn Surface>,
    issued: AtomicU64,
    state: Mutex<SubtitleState>,
}

impl ReasoningSubtitle {
    pub fn new(overlay: Arc<dyn ReasoningOverlay>, surface: Arc<dyn Surface>) -> Arc<Self> {
        Arc::new(Self {
            overlay,
            surface,
            issued: AtomicU64::new(0),
            state: Mutex::new(SubtitleState::default()),
        })
    }

    /// Push new text to the overlay without waiting for it
    pub fn update(self: &Arc<Self>, text: String) -> EffectHandle {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available; skipping reasoning overlay update");
            return EffectHandle::skipped();
        };
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let subtitle = self.clone();
        let task = runtime.spawn(async move {
            let mut state = subtitle.state.lock().await;
            if state.cleared || seq <= state.applied {
                debug!("Reasoning overlay update {} superseded", seq);
                return EffectOutcome::Skipped;
            }
            state.applied = seq;
            best_effort(
                "Reasoning overlay update",
                subtitle.overlay.update(subtitle.surface.as_ref(), &text),
            )
            .await
        });
        EffectHandle { task: Some(task) }
    }

    /// Blank the overlay for good. Waits for an update already in flight.
    pub async fn clear(&self) -> EffectOutcome {
        let mut state = self.state.lock().await;
        state.cleared = true;
        best_effort(
            "Reasoning overlay clear",
            self.overlay.update(self.surface.as_ref(), ""),
        )
        .await
    }
}
