//! Process-wide table of tracked sessions.
//!
//! The table is only mutated through the methods here. Mutators on ids the
//! registry does not know are no-ops, so late updates racing a sweep are
//! harmless. Observers are notified, and diagnostics logged, only after the
//! table lock is released, so a log-capturing subscriber may call back in.
//! A separate reentrant notify lock is held from the append until the
//! fan-out ends, so observers see entries in the same order as `logs(id)`.

use crate::models::{LogEntry, LogKind, Session, SessionStatus, SessionSummary};
use crate::observer::SessionObserver;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::{ReentrantMutex, RwLock};
use scout_config::SessionsConfig;
use scout_core::{TaskConfig, TaskRun};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

static GLOBAL: Lazy<Arc<SessionRegistry>> = Lazy::new(|| Arc::new(SessionRegistry::new()));

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    observers: RwLock<Vec<Arc<dyn SessionObserver>>>,
    notify: ReentrantMutex<()>,
    max_logs: usize,
    retention: chrono::Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::from_config(&SessionsConfig::default())
    }

    pub fn from_config(config: &SessionsConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
            notify: ReentrantMutex::new(()),
            max_logs: config.max_logs.max(1),
            retention: chrono::Duration::minutes(config.retention_minutes as i64),
        }
    }

    /// The registry shared by the whole process
    pub fn global() -> Arc<SessionRegistry> {
        GLOBAL.clone()
    }

    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) {
        self.observers.write().push(observer);
    }

    fn observers(&self) -> Vec<Arc<dyn SessionObserver>> {
        self.observers.read().clone()
    }

    pub fn create(&self, config: TaskConfig) -> String {
        let _ordered = self.notify.lock();
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions
            .write()
            .insert(id.clone(), Session::new(id.clone(), config));
        info!("Session {} created", id);

        for observer in self.observers() {
            observer.on_created(&id);
        }
        id
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Newest first
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .read()
            .values()
            .map(Session::summary)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    pub fn logs(&self, id: &str) -> Option<Vec<LogEntry>> {
        self.sessions
            .read()
            .get(id)
            .map(|session| session.logs.iter().cloned().collect())
    }

    /// Move a session to `status` and log the transition. A session that
    /// already reached a terminal status keeps it.
    pub fn update_status(&self, id: &str, status: SessionStatus) {
        let _ordered = self.notify.lock();
        let entry = Self::open_session(&mut self.sessions.write(), id).map(|session| {
            session.status = status;
            if status.is_terminal() {
                session.completed_at = Some(Utc::now());
            }
            self.push_log(
                session,
                LogEntry::new(
                    LogKind::Status,
                    status.as_str(),
                    Some(json!({ "status": status.as_str() })),
                ),
            )
        });
        let entry = match entry {
            Ok(entry) => entry,
            Err(reason) => {
                debug!(
                    "Transition of session {} to {} ignored: {}",
                    id,
                    status.as_str(),
                    reason
                );
                return;
            }
        };

        for observer in self.observers() {
            observer.on_status_changed(id, status);
            observer.on_log_appended(id, &entry);
        }
    }

    /// Record a finished run. Ignored for unknown or already-terminal sessions.
    pub fn set_result(&self, id: &str, run: &TaskRun) {
        let _ordered = self.notify.lock();
        let entry = Self::open_session(&mut self.sessions.write(), id).map(|session| {
            session.status = SessionStatus::Completed;
            session.result = Some(run.result.clone());
            session.completed_at = Some(Utc::now());

            let message = run.result.message.clone().unwrap_or_default();
            let data = serde_json::to_value(run).ok();
            self.push_log(session, LogEntry::new(LogKind::Result, &message, data))
        });
        let entry = match entry {
            Ok(entry) => entry,
            Err(reason) => {
                debug!("set_result on session {} ignored: {}", id, reason);
                return;
            }
        };

        for observer in self.observers() {
            observer.on_completed(id, &run.result);
            observer.on_log_appended(id, &entry);
        }
    }

    /// Record a failed run. Ignored for unknown or already-terminal sessions.
    pub fn set_error(&self, id: &str, message: &str) {
        let _ordered = self.notify.lock();
        let entry = Self::open_session(&mut self.sessions.write(), id).map(|session| {
            session.status = SessionStatus::Error;
            session.error = Some(message.to_string());
            session.completed_at = Some(Utc::now());
            self.push_log(session, LogEntry::new(LogKind::Error, message, None))
        });
        let entry = match entry {
            Ok(entry) => entry,
            Err(reason) => {
                debug!("set_error on session {} ignored: {}", id, reason);
                return;
            }
        };

        for observer in self.observers() {
            observer.on_error(id, message);
            observer.on_log_appended(id, &entry);
        }
    }

    pub fn add_log(&self, id: &str, kind: LogKind, message: &str, data: Option<Value>) {
        let _ordered = self.notify.lock();
        let entry = self
            .sessions
            .write()
            .get_mut(id)
            .map(|session| self.push_log(session, LogEntry::new(kind, message, data)));
        let Some(entry) = entry else {
            debug!("add_log on unknown session {}", id);
            return;
        };

        for observer in self.observers() {
            observer.on_log_appended(id, &entry);
        }
    }

    /// External cancellation. Does not stop a run already in flight.
    /// Returns false when the session is unknown or already finished.
    pub fn cancel(&self, id: &str) -> bool {
        let _ordered = self.notify.lock();
        let entry = Self::open_session(&mut self.sessions.write(), id).map(|session| {
            session.status = SessionStatus::Cancelled;
            session.completed_at = Some(Utc::now());
            self.push_log(
                session,
                LogEntry::new(
                    LogKind::Status,
                    SessionStatus::Cancelled.as_str(),
                    Some(json!({ "status": SessionStatus::Cancelled.as_str() })),
                ),
            )
        });
        let entry = match entry {
            Ok(entry) => entry,
            Err(reason) => {
                debug!("cancel on session {} ignored: {}", id, reason);
                return false;
            }
        };
        info!("Session {} cancelled", id);

        for observer in self.observers() {
            observer.on_status_changed(id, SessionStatus::Cancelled);
            observer.on_log_appended(id, &entry);
        }
        true
    }

    /// Drop finished sessions older than the retention window
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let removed = {
            let mut sessions = self.sessions.write();
            let before = sessions.len();
            sessions.retain(|_, session| {
                let expired = session.status.is_terminal()
                    && session
                        .completed_at
                        .map(|completed| now - completed > self.retention)
                        .unwrap_or(false);
                !expired
            });
            before - sessions.len()
        };
        if removed > 0 {
            debug!("Swept {} expired sessions", removed);
        }
        removed
    }

    /// A known session that has not finished yet
    fn open_session<'a>(
        sessions: &'a mut HashMap<String, Session>,
        id: &str,
    ) -> Result<&'a mut Session, &'static str> {
        match sessions.get_mut(id) {
            Some(session) if session.status.is_terminal() => Err("session already finished"),
            Some(session) => Ok(session),
            None => Err("unknown session"),
        }
    }

    /// Append and enforce the cap by dropping the oldest entries
    fn push_log(&self, session: &mut Session, entry: LogEntry) -> LogEntry {
        session.logs.push_back(entry.clone());
        while session.logs.len() > self.max_logs {
            session.logs.pop_front();
        }
        entry
    }
}
