//! Draining the engine's two output streams.
//!
//! The structured stream (tool calls and tool results) and the free-text
//! stream are independent; each is drained by its own loop and both loops run
//! interleaved on the current task until both sources are exhausted. No
//! ordering is enforced between them.

use crate::capability::AgentEvent;
use crate::reasoning::{clean_text_delta, extract_reasoning};
use crate::run_context::RunContext;
use crate::thoughts::ThoughtSource;
use anyhow::Result;
use futures_util::stream::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

/// Counters describing what the consumer saw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub events: usize,
    pub skipped_events: usize,
    pub thoughts: usize,
    pub actions: usize,
    pub text_deltas: usize,
}

/// Drive both streams to completion
pub async fn consume_streams<E, T>(
    context: &RunContext,
    full_stream: E,
    text_stream: T,
) -> StreamStats
where
    E: Stream<Item = Result<AgentEvent>> + Unpin,
    T: Stream<Item = String> + Unpin,
{
    let (mut stats, text_deltas) = tokio::join!(
        drain_events(context, full_stream),
        drain_text(context, text_stream)
    );
    stats.text_deltas = text_deltas;
    debug!(
        "Streams drained: {} events ({} skipped), {} thoughts, {} actions, {} text deltas",
        stats.events, stats.skipped_events, stats.thoughts, stats.actions, stats.text_deltas
    );
    stats
}

async fn drain_events<E>(context: &RunContext, mut stream: E) -> StreamStats
where
    E: Stream<Item = Result<AgentEvent>> + Unpin,
{
    let mut stats = StreamStats::default();
    while let Some(item) = stream.next().await {
        stats.events += 1;
        match item {
            Ok(event) => handle_event(context, event, &mut stats),
            Err(e) => {
                // One malformed item must not end the run
                stats.skipped_events += 1;
                warn!("Skipping unreadable stream event: {:#}", e);
            }
        }
    }
    stats
}

fn handle_event(context: &RunContext, event: AgentEvent, stats: &mut StreamStats) {
    match event {
        AgentEvent::ToolCall {
            tool_name,
            args,
            input,
        } => {
            if context.is_reasoning_tool(&tool_name) {
                if let Some(text) = extract_reasoning(args.as_ref(), input.as_ref()) {
                    if context.accept_thought(&text, ThoughtSource::Stream).is_some() {
                        stats.thoughts += 1;
                    }
                }
            } else {
                let payload = args.or(input).unwrap_or(Value::Null);
                context.emit_action(&tool_name, payload);
                stats.actions += 1;
            }
        }
        AgentEvent::ToolResult { tool_name, result } => {
            if !context.is_reasoning_tool(&tool_name) {
                return;
            }
            if let Some(text) = extract_reasoning(result.as_ref(), None) {
                if context.accept_thought(&text, ThoughtSource::ToolResult).is_some() {
                    stats.thoughts += 1;
                }
            }
        }
        AgentEvent::Other => {}
    }
}

async fn drain_text<T>(context: &RunContext, mut stream: T) -> usize
where
    T: Stream<Item = String> + Unpin,
{
    let mut count = 0;
    while let Some(delta) = stream.next().await {
        count += 1;
        let cleaned = clean_text_delta(&delta);
        if !cleaned.is_empty() {
            context.sink().write_output(&cleaned);
        }
    }
    count
}
