//! Session tracking for scout task runs: a process-wide registry with
//! observer notifications, log capture into sessions, and the runner that
//! ties an orchestrator run to a session.

pub mod capture;
pub mod logging;
pub mod models;
pub mod observer;
pub mod registry;
pub mod runner;
pub mod sink;
pub mod sweeper;

pub use capture::{CaptureError, CaptureGuard, CaptureLayer, LogCapture, MIRROR_TARGET};
pub use logging::initialize_logging;
pub use models::{LogEntry, LogKind, Session, SessionStatus, SessionSummary};
pub use observer::{EventBroadcaster, SessionEvent, SessionObserver};
pub use registry::SessionRegistry;
pub use runner::{run_session, spawn_session};
pub use sink::SessionSink;
pub use sweeper::{spawn_configured_sweeper, spawn_sweeper, sweep_period};
