use chrono::{DateTime, Utc};
use scout_core::{FinalResult, TaskConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initializing,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Error | SessionStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Think,
    Action,
    Status,
    Error,
    Log,
    Result,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Think => "think",
            LogKind::Action => "action",
            LogKind::Status => "status",
            LogKind::Error => "error",
            LogKind::Log => "log",
            LogKind::Result => "result",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: &str, data: Option<Value>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            message: message.to_string(),
            data,
        }
    }
}

/// One tracked orchestrator run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub config: TaskConfig,
    pub result: Option<FinalResult>,
    pub error: Option<String>,
    /// Oldest first, capped by the registry
    pub logs: VecDeque<LogEntry>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(id: String, config: TaskConfig) -> Self {
        Self {
            id,
            status: SessionStatus::Initializing,
            config,
            result: None,
            error: None,
            logs: VecDeque::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            status: self.status,
            website: self.config.website.clone(),
            instruction: self.config.instruction.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
            log_count: self.logs.len(),
        }
    }
}

/// Lightweight listing row for observers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub status: SessionStatus,
    pub website: String,
    pub instruction: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub log_count: usize,
}
