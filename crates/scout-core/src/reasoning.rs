//! Text cleaning for reasoning emitted by the agent.
//!
//! Models wrap their narration in all sorts of noise: half-serialized JSON
//! objects, field-name prefixes, escaped newlines, terminal escapes and
//! control tags. Everything that ends up in a thought record or a final
//! result message goes through this module first.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Fields probed (in order) for the narration text of a reasoning payload
pub const REASONING_FIELDS: [&str; 3] = ["thought", "text", "input"];

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Task completed successfully";
pub const DEFAULT_FAILURE_MESSAGE: &str = "Task did not complete successfully";

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").unwrap());
static CONTROL_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[<\[]\s*/?\s*ctrl\d*\s*[>\]]").unwrap());
static REASONING_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^\{\s*"?reasoning"?\s*:\s*"#).unwrap());
static FIELD_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^"?(?:thought|text|input)"?\s*:\s*"#).unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Remove ANSI color/cursor escape sequences
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Produce display-safe reasoning text from raw model output.
///
/// Idempotent: the cleaning rules are re-applied until the text stops
/// changing, so `normalize_reasoning(normalize_reasoning(x)) == normalize_reasoning(x)`.
pub fn normalize_reasoning(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = normalize_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Normalize an arbitrary JSON payload (non-strings are pretty-printed first)
pub fn normalize_value(value: &Value) -> String {
    normalize_reasoning(&coerce_to_text(value))
}

fn normalize_once(text: &str) -> String {
    let unescaped = text
        .replace("\\n", " ")
        .replace("\\r", " ")
        .replace("\\t", " ")
        .replace("\\\"", "\"");
    let without_ansi = strip_ansi(&unescaped);
    let without_tags = CONTROL_TAG.replace_all(&without_ansi, "");
    let printable = strip_control_chars(&without_tags);
    let collapsed = WHITESPACE_RUN.replace_all(&printable, " ");
    let mut out = collapsed.trim().to_string();

    out = REASONING_PREFIX.replace(&out, "").into_owned();

    out = out
        .trim_start_matches(['{', '['])
        .trim_end_matches(['}', ']'])
        .trim()
        .to_string();

    // Field prefixes go before the quote pair so `"text": "x"` unwraps cleanly
    out = FIELD_PREFIX.replace(&out, "").trim().to_string();

    if out.len() >= 2 && out.starts_with('"') && out.ends_with('"') {
        out = out[1..out.len() - 1].trim().to_string();
    }
    out
}

/// Whitespace controls become spaces, every other control character is dropped
fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\n' | '\r' | '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// Clean the final result message: control characters and bracketed control
/// tags are removed, whitespace collapsed. May return an empty string.
pub fn sanitize_message(raw: &str) -> String {
    let without_ansi = strip_ansi(raw);
    let without_tags = CONTROL_TAG.replace_all(&without_ansi, "");
    let printable = strip_control_chars(&without_tags);
    WHITESPACE_RUN
        .replace_all(&printable, " ")
        .trim()
        .to_string()
}

/// Sanitize a final message, substituting a generic one when nothing legible remains
pub fn sanitize_final_message(message: Option<&str>, success: bool) -> String {
    let cleaned = sanitize_message(message.unwrap_or_default());
    if !cleaned.is_empty() {
        return cleaned;
    }
    if success {
        DEFAULT_SUCCESS_MESSAGE.to_string()
    } else {
        DEFAULT_FAILURE_MESSAGE.to_string()
    }
}

/// Filter a raw text delta for incidental output. Newlines and tabs survive
/// so streamed prose keeps its shape.
pub fn clean_text_delta(delta: &str) -> String {
    strip_ansi(delta)
        .chars()
        .filter(|c| matches!(c, '\n' | '\t') || !c.is_control())
        .collect()
}

/// Pick the narration out of a reasoning tool payload.
///
/// Priority: `args.thought`, `args.text`, `args.input`, then the same fields
/// on `input` when it is an object, then the raw `input`, then the raw `args`.
/// Null candidates are skipped. Returns `None` when nothing usable exists.
pub fn extract_reasoning(args: Option<&Value>, input: Option<&Value>) -> Option<String> {
    let candidate = reasoning_field(args)
        .or_else(|| reasoning_field(input))
        .or_else(|| input.filter(|v| !v.is_null()))
        .or_else(|| args.filter(|v| !v.is_null()))?;
    Some(coerce_to_text(candidate))
}

fn reasoning_field(value: Option<&Value>) -> Option<&Value> {
    let value = value?;
    REASONING_FIELDS
        .iter()
        .find_map(|field| value.get(*field).filter(|v| !v.is_null()))
}

/// Strings pass through; everything else is pretty JSON (2-space indent)
pub fn coerce_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
