//! Thought records and first-seen deduplication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which channel produced a thought. Provenance only; never part of dedup identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtSource {
    Stream,
    StepFinish,
    ToolResult,
    FinalReasoning,
}

impl ThoughtSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThoughtSource::Stream => "stream",
            ThoughtSource::StepFinish => "step_finish",
            ThoughtSource::ToolResult => "tool_result",
            ThoughtSource::FinalReasoning => "final_reasoning",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThoughtEntry {
    /// 1-based step counter at time of capture
    pub step: u32,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub source: ThoughtSource,
}

/// Set of normalized thought strings already emitted during one run
#[derive(Debug, Default)]
pub struct ThoughtDeduplicator {
    seen: HashSet<String>,
}

impl ThoughtDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True (and remembered) on first occurrence of `normalized`, false afterwards.
    /// The empty string is treated like any other value.
    pub fn should_emit(&mut self, normalized: &str) -> bool {
        if self.seen.contains(normalized) {
            return false;
        }
        self.seen.insert(normalized.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Ordered, append-only thought timeline for a single run
#[derive(Debug, Default)]
pub struct ThoughtLog {
    dedup: ThoughtDeduplicator,
    entries: Vec<ThoughtEntry>,
}

impl ThoughtLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an already-normalized thought unless it is blank or a repeat.
    /// Returns the new entry when one was created.
    pub fn record(
        &mut self,
        step: u32,
        normalized: &str,
        source: ThoughtSource,
    ) -> Option<ThoughtEntry> {
        if normalized.is_empty() || !self.dedup.should_emit(normalized) {
            return None;
        }
        let entry = ThoughtEntry {
            step,
            text: normalized.to_string(),
            timestamp: Utc::now(),
            source,
        };
        self.entries.push(entry.clone());
        Some(entry)
    }

    pub fn entries(&self) -> &[ThoughtEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ThoughtEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_order_wins() {
        let mut dedup = ThoughtDeduplicator::new();
        let accepted: Vec<&str> = ["a", "b", "a", "c", "b"]
            .into_iter()
            .filter(|text| dedup.should_emit(text))
            .collect();
        assert_eq!(accepted, vec!["a", "b", "c"]);
        assert_eq!(dedup.len(), 3);
    }

    #[test]
    fn test_empty_string_recorded_once() {
        let mut dedup = ThoughtDeduplicator::new();
        assert!(dedup.should_emit(""));
        assert!(!dedup.should_emit(""));
    }

    #[test]
    fn test_log_skips_blank_and_repeats_across_sources() {
        let mut log = ThoughtLog::new();
        assert!(log.record(1, "Scanning header", ThoughtSource::Stream).is_some());
        assert!(log.record(1, "Scanning header", ThoughtSource::StepFinish).is_none());
        assert!(log.record(2, "", ThoughtSource::StepFinish).is_none());
        assert!(log.record(2, "Opening menu", ThoughtSource::ToolResult).is_some());

        let entries = log.into_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source, ThoughtSource::Stream);
        assert_eq!(entries[1].step, 2);
    }

    #[test]
    fn test_source_serializes_snake_case() {
        let json = serde_json::to_string(&ThoughtSource::FinalReasoning).unwrap();
        assert_eq!(json, "\"final_reasoning\"");
        assert_eq!(ThoughtSource::StepFinish.as_str(), "step_finish");
    }
}
