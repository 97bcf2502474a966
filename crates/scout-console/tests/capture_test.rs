//! Tests for routing tracing output into session logs

use scout_console::{
    CaptureError, LogCapture, LogEntry, LogKind, SessionObserver, SessionRegistry, MIRROR_TARGET,
};
use scout_core::TaskConfig;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;

fn setup() -> (Arc<SessionRegistry>, LogCapture, String) {
    let registry = Arc::new(SessionRegistry::new());
    let capture = LogCapture::new(registry.clone());
    let id = registry.create(TaskConfig::new("https://example.com", "Check the footer"));
    (registry, capture, id)
}

/// Run `f` with only the capture layer installed on this thread
fn with_capture<F: FnOnce()>(capture: &LogCapture, f: F) {
    let subscriber = tracing_subscriber::registry().with(capture.layer());
    tracing::subscriber::with_default(subscriber, f);
}

fn entries(registry: &SessionRegistry, id: &str) -> Vec<(LogKind, String)> {
    registry
        .logs(id)
        .unwrap()
        .into_iter()
        .map(|entry| (entry.kind, entry.message))
        .collect()
}

#[test]
fn test_events_are_classified_into_the_session() {
    let (registry, capture, id) = setup();
    let guard = capture.start_logging(&id).unwrap();

    with_capture(&capture, || {
        tracing::info!("💭 Thinking: The footer has a contact link");
        tracing::info!("⚡ Action: click {}", "#contact");
        tracing::info!("Page loaded in {}ms", 120);
        tracing::warn!("Slow response");
        tracing::debug!("frame attached");
        tracing::trace!("raw bytes");
        tracing::error!("Navigation failed");
        tracing::info!("   ");
        tracing::info!("Thinking:");
    });
    capture.stop_logging(guard);

    assert_eq!(
        entries(&registry, &id),
        vec![
            (LogKind::Think, "The footer has a contact link".to_string()),
            (LogKind::Action, "click #contact".to_string()),
            (LogKind::Log, "Page loaded in 120ms".to_string()),
            (LogKind::Log, "WARN: Slow response".to_string()),
            (LogKind::Log, "DEBUG: frame attached".to_string()),
            (LogKind::Log, "DEBUG: raw bytes".to_string()),
            (LogKind::Error, "Navigation failed".to_string()),
        ]
    );
}

#[test]
fn test_fields_and_ansi_are_rendered() {
    let (registry, capture, id) = setup();
    let _guard = capture.start_logging(&id).unwrap();

    let err = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
    with_capture(&capture, || {
        tracing::info!(attempt = 2, "\u{1b}[32mRetrying\u{1b}[0m");
        tracing::info!(error = &err as &(dyn std::error::Error + 'static), "Request failed");
    });

    let logs = entries(&registry, &id);
    assert_eq!(logs[0], (LogKind::Log, "Retrying attempt=2".to_string()));
    assert_eq!(
        logs[1],
        (LogKind::Log, "Request failed error=Error: socket closed".to_string())
    );
}

#[test]
fn test_mirrored_lines_are_not_recorded() {
    let (registry, capture, id) = setup();
    let _guard = capture.start_logging(&id).unwrap();

    with_capture(&capture, || {
        tracing::info!(target: MIRROR_TARGET, "💭 Thinking: mirrored");
    });

    assert!(registry.logs(&id).unwrap().is_empty());
}

#[test]
fn test_nothing_recorded_without_active_session() {
    let (registry, capture, id) = setup();

    with_capture(&capture, || tracing::info!("nobody is listening"));

    {
        let _guard = capture.start_logging(&id).unwrap();
    }
    with_capture(&capture, || tracing::info!("released already"));

    assert!(registry.logs(&id).unwrap().is_empty());
    assert_eq!(capture.active_session(), None);
}

#[test]
fn test_second_start_is_rejected_until_released() {
    let (registry, capture, first) = setup();
    let second = registry.create(TaskConfig::new("https://example.org", "Other"));

    let guard = capture.start_logging(&first).unwrap();
    assert_eq!(
        capture.start_logging(&second).unwrap_err(),
        CaptureError::AlreadyActive {
            session_id: first.clone()
        }
    );
    assert_eq!(capture.active_session(), Some(first.clone()));

    capture.stop_logging(guard);
    let guard = capture.start_logging(&second).unwrap();
    assert_eq!(guard.session_id(), second);

    with_capture(&capture, || tracing::info!("for the second session"));
    assert!(registry.logs(&first).unwrap().is_empty());
    assert_eq!(registry.logs(&second).unwrap().len(), 1);
}

/// Panics on the first appended entry only
struct PanicOnceObserver {
    fired: AtomicBool,
}

impl SessionObserver for PanicOnceObserver {
    fn on_log_appended(&self, _session_id: &str, _entry: &LogEntry) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            panic!("observer blew up");
        }
    }
}

#[test]
fn test_capture_recovers_after_observer_panic() {
    let (registry, capture, id) = setup();
    registry.subscribe(Arc::new(PanicOnceObserver {
        fired: AtomicBool::new(false),
    }));
    let _guard = capture.start_logging(&id).unwrap();

    with_capture(&capture, || {
        let outcome = catch_unwind(AssertUnwindSafe(|| tracing::info!("first line")));
        assert!(outcome.is_err());
        tracing::info!("second line");
    });

    assert_eq!(
        entries(&registry, &id),
        vec![
            (LogKind::Log, "first line".to_string()),
            (LogKind::Log, "second line".to_string()),
        ]
    );
}
