//! Global subscriber installation with the capture layer

use scout_console::{initialize_logging, LogCapture, LogKind, SessionRegistry};
use scout_core::TaskConfig;
use std::sync::Arc;

#[test]
fn test_installed_capture_layer_records_events() {
    let registry = Arc::new(SessionRegistry::new());
    let capture = LogCapture::new(registry.clone());
    initialize_logging(false, Some(&capture));
    // A second call is harmless
    initialize_logging(true, None);

    let id = registry.create(TaskConfig::new("https://example.com", "Read the headline"));
    let guard = capture.start_logging(&id).unwrap();
    tracing::warn!(target: "scout_console", "Headline is hidden behind a banner");
    capture.stop_logging(guard);

    let logs = registry.logs(&id).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].kind, LogKind::Log);
    assert_eq!(logs[0].message, "WARN: Headline is hidden behind a banner");
}
