//! Tests for the session registry: log cap, sweep window, lifecycle guards
//! and observer fan-out.

use chrono::{Duration, Utc};
use futures_util::StreamExt;
use parking_lot::Mutex;
use scout_console::{
    EventBroadcaster, LogEntry, LogKind, SessionObserver, SessionRegistry, SessionStatus,
};
use scout_core::{FinalResult, TaskConfig, TaskRun};
use serde_json::json;
use std::sync::Arc;

// =============================================================================
// Helpers
// =============================================================================

fn config() -> TaskConfig {
    TaskConfig::new("https://example.com", "Find the pricing page")
}

fn finished_run(message: &str) -> TaskRun {
    TaskRun {
        task_id: "task-1".to_string(),
        thoughts: Vec::new(),
        result: FinalResult {
            success: true,
            message: Some(message.to_string()),
            actions: Vec::new(),
        },
        steps: 3,
    }
}

/// Records every notification it sees into a shared journal
struct JournalObserver {
    name: &'static str,
    journal: Arc<Mutex<Vec<String>>>,
}

impl SessionObserver for JournalObserver {
    fn on_created(&self, session_id: &str) {
        self.journal.lock().push(format!("{}:created:{}", self.name, session_id));
    }

    fn on_status_changed(&self, _session_id: &str, status: SessionStatus) {
        self.journal.lock().push(format!("{}:status:{}", self.name, status.as_str()));
    }

    fn on_log_appended(&self, _session_id: &str, entry: &LogEntry) {
        self.journal
            .lock()
            .push(format!("{}:log:{}:{}", self.name, entry.kind.as_str(), entry.message));
    }

    fn on_completed(&self, _session_id: &str, result: &FinalResult) {
        self.journal.lock().push(format!(
            "{}:completed:{}",
            self.name,
            result.message.clone().unwrap_or_default()
        ));
    }

    fn on_error(&self, _session_id: &str, message: &str) {
        self.journal.lock().push(format!("{}:error:{}", self.name, message));
    }
}

// =============================================================================
// Log buffer
// =============================================================================

#[test]
fn test_log_buffer_keeps_most_recent_thousand() {
    let registry = SessionRegistry::new();
    let id = registry.create(config());

    for i in 0..1500 {
        registry.add_log(&id, LogKind::Log, &format!("line {}", i), None);
    }

    let logs = registry.logs(&id).unwrap();
    assert_eq!(logs.len(), 1000);
    assert_eq!(logs.first().unwrap().message, "line 500");
    assert_eq!(logs.last().unwrap().message, "line 1499");
    for (offset, entry) in logs.iter().enumerate() {
        assert_eq!(entry.message, format!("line {}", 500 + offset));
    }
}

#[test]
fn test_mutators_ignore_unknown_sessions() {
    let registry = SessionRegistry::new();
    registry.add_log("missing", LogKind::Log, "hello", None);
    registry.update_status("missing", SessionStatus::Running);
    registry.set_result("missing", &finished_run("ok"));
    registry.set_error("missing", "boom");
    assert!(!registry.cancel("missing"));
    assert!(registry.is_empty());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_status_result_and_error_lifecycle() {
    let registry = SessionRegistry::new();
    let ok = registry.create(config());
    let failed = registry.create(config());

    assert_eq!(registry.get(&ok).unwrap().status, SessionStatus::Initializing);

    registry.update_status(&ok, SessionStatus::Running);
    registry.set_result(&ok, &finished_run("Found it"));
    let session = registry.get(&ok).unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.result.unwrap().message.as_deref(), Some("Found it"));
    assert!(session.completed_at.is_some());
    let kinds: Vec<LogKind> = session.logs.iter().map(|entry| entry.kind).collect();
    assert_eq!(kinds, vec![LogKind::Status, LogKind::Result]);

    registry.set_error(&failed, "navigation failed");
    let session = registry.get(&failed).unwrap();
    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(session.error.as_deref(), Some("navigation failed"));
    assert_eq!(session.logs.back().unwrap().kind, LogKind::Error);
}

#[test]
fn test_cancelled_session_keeps_status() {
    let registry = SessionRegistry::new();
    let id = registry.create(config());
    registry.update_status(&id, SessionStatus::Running);

    assert!(registry.cancel(&id));
    assert!(!registry.cancel(&id));

    // A run finishing after cancellation does not overwrite it
    registry.update_status(&id, SessionStatus::Running);
    registry.set_result(&id, &finished_run("late"));
    let session = registry.get(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert!(session.result.is_none());
    assert!(session.completed_at.is_some());
}

#[test]
fn test_list_is_newest_first() {
    let registry = SessionRegistry::new();
    let first = registry.create(config());
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = registry.create(config());

    let ids: Vec<String> = registry.list().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![second, first]);
}

// =============================================================================
// Sweep
// =============================================================================

#[test]
fn test_sweep_boundary() {
    let registry = SessionRegistry::new();
    let finished = registry.create(config());
    let running = registry.create(config());
    registry.set_result(&finished, &finished_run("done"));
    registry.update_status(&running, SessionStatus::Running);

    let completed_at = registry.get(&finished).unwrap().completed_at.unwrap();

    assert_eq!(registry.sweep_at(completed_at + Duration::minutes(59)), 0);
    assert!(registry.get(&finished).is_some());

    assert_eq!(registry.sweep_at(completed_at + Duration::minutes(61)), 1);
    assert!(registry.get(&finished).is_none());

    assert_eq!(registry.sweep_at(Utc::now() + Duration::days(30)), 0);
    assert_eq!(registry.get(&running).unwrap().status, SessionStatus::Running);
}

#[test]
fn test_sweep_removes_errors_and_cancellations() {
    let registry = SessionRegistry::new();
    let failed = registry.create(config());
    let cancelled = registry.create(config());
    registry.set_error(&failed, "boom");
    registry.cancel(&cancelled);

    assert_eq!(registry.sweep_at(Utc::now() + Duration::minutes(61)), 2);
    assert!(registry.is_empty());
}

// =============================================================================
// Notifications
// =============================================================================

#[test]
fn test_log_fan_out_in_registration_order() {
    let registry = SessionRegistry::new();
    let journal = Arc::new(Mutex::new(Vec::new()));
    registry.subscribe(Arc::new(JournalObserver {
        name: "first",
        journal: journal.clone(),
    }));
    registry.subscribe(Arc::new(JournalObserver {
        name: "second",
        journal: journal.clone(),
    }));

    let id = registry.create(config());
    journal.lock().clear();

    registry.add_log(&id, LogKind::Think, "Looking at the header", None);

    assert_eq!(
        *journal.lock(),
        vec![
            "first:log:think:Looking at the header".to_string(),
            "second:log:think:Looking at the header".to_string(),
        ]
    );
}

#[test]
fn test_lifecycle_notifications() {
    let registry = SessionRegistry::new();
    let journal = Arc::new(Mutex::new(Vec::new()));
    registry.subscribe(Arc::new(JournalObserver {
        name: "obs",
        journal: journal.clone(),
    }));

    let id = registry.create(config());
    registry.update_status(&id, SessionStatus::Running);
    registry.set_result(&id, &finished_run("All done"));

    assert_eq!(
        *journal.lock(),
        vec![
            format!("obs:created:{}", id),
            "obs:status:running".to_string(),
            "obs:log:status:running".to_string(),
            "obs:completed:All done".to_string(),
            "obs:log:result:All done".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_broadcaster_filters_by_session() {
    let registry = SessionRegistry::new();
    let broadcaster = EventBroadcaster::new(64);
    registry.subscribe(broadcaster.clone());

    let watched = registry.create(config());
    let other = registry.create(config());
    let mut events = Box::pin(broadcaster.subscribe(&watched));

    registry.add_log(&other, LogKind::Log, "not for us", None);
    registry.add_log(&watched, LogKind::Action, "click", Some(json!({"selector": "#menu"})));
    registry.set_error(&watched, "page crashed");

    let first = tokio::time::timeout(std::time::Duration::from_secs(1), events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.session_id, watched);
    assert_eq!(first.kind, LogKind::Action);
    assert_eq!(first.data, Some(json!({"selector": "#menu"})));

    let second = tokio::time::timeout(std::time::Duration::from_secs(1), events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.kind, LogKind::Error);
    assert_eq!(second.message, "page crashed");
}

/// Keeps the message of every appended entry, in notification order
#[derive(Default)]
struct OrderObserver {
    seen: Mutex<Vec<String>>,
}

impl SessionObserver for OrderObserver {
    fn on_log_appended(&self, _session_id: &str, entry: &LogEntry) {
        self.seen.lock().push(entry.message.clone());
    }
}

#[test]
fn test_notifications_follow_buffer_order_across_threads() {
    let registry = Arc::new(SessionRegistry::new());
    let observer = Arc::new(OrderObserver::default());
    registry.subscribe(observer.clone());
    let id = registry.create(config());

    let writers: Vec<_> = (0..4)
        .map(|writer| {
            let registry = registry.clone();
            let id = id.clone();
            std::thread::spawn(move || {
                for n in 0..100 {
                    registry.add_log(&id, LogKind::Log, &format!("{}-{}", writer, n), None);
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let buffered: Vec<String> = registry
        .logs(&id)
        .unwrap()
        .into_iter()
        .map(|entry| entry.message)
        .collect();
    assert_eq!(buffered.len(), 400);
    assert_eq!(*observer.seen.lock(), buffered);
}

#[test]
fn test_global_registry_is_shared() {
    let first = SessionRegistry::global();
    let second = SessionRegistry::global();
    assert!(Arc::ptr_eq(&first, &second));

    let id = first.create(config());
    assert!(second.get(&id).is_some());
}

#[tokio::test]
async fn test_broadcaster_all_sessions_feed() {
    let registry = SessionRegistry::new();
    let broadcaster = EventBroadcaster::new(16);
    registry.subscribe(broadcaster.clone());
    let mut all = broadcaster.subscribe_all();

    let a = registry.create(config());
    let b = registry.create(config());
    registry.add_log(&a, LogKind::Log, "from a", None);
    registry.add_log(&b, LogKind::Log, "from b", None);

    let first = all.recv().await.unwrap();
    let second = all.recv().await.unwrap();
    assert_eq!((first.session_id, first.message), (a, "from a".to_string()));
    assert_eq!((second.session_id, second.message), (b, "from b".to_string()));
}
