//! Best-effort extraction from loosely-typed payloads.
//!
//! Everything here is total: a payload that does not parse degrades to
//! fallback text, never to an error.

use chrono::{DateTime, Utc};
use serde_json::Value;
use shared_types::{LogEntry, LogEntryKind, Step, StepStatus};

fn parse_object(raw: &str) -> Option<serde_json::Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn string_field<'a>(map: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// The task or prompt a step handed to a sub-agent, if any.
pub fn step_prompt(step: &Step) -> String {
    parse_object(&step.args_payload)
        .and_then(|args| {
            string_field(&args, "task")
                .or_else(|| string_field(&args, "prompt"))
                .map(ToString::to_string)
        })
        .unwrap_or_default()
}

/// Human-readable command line for a `command` log entry, whose content is
/// a serialized step.
pub fn command_display(content: &str) -> String {
    let Some(step) = parse_object(content) else {
        return content.to_string();
    };

    if let Some(args) = string_field(&step, "args").and_then(parse_object) {
        if let Some(command) = string_field(&args, "command").or_else(|| string_field(&args, "task"))
        {
            return command.to_string();
        }
    }

    string_field(&step, "label")
        .or_else(|| string_field(&step, "tool"))
        .unwrap_or(content)
        .to_string()
}

/// Synthesize log lines for a step detail view from the step alone.
pub fn step_entries(step: &Step, now: DateTime<Utc>) -> Vec<LogEntry> {
    let started = step.started_at.unwrap_or(now);
    let finished = step.finished_at.unwrap_or(started);

    let serialized = serde_json::to_string(step).unwrap_or_else(|_| step.label.clone());
    let mut entries = vec![LogEntry {
        kind: LogEntryKind::Command,
        content: serialized,
        timestamp: started,
    }];

    if let Some(result) = step.result.as_ref().filter(|r| !r.is_empty()) {
        entries.push(LogEntry {
            kind: if step.status == StepStatus::Error {
                LogEntryKind::Error
            } else {
                LogEntryKind::Output
            },
            content: result.clone(),
            timestamp: finished,
        });
    }
    entries
}

/// `850ms`, `4.2s`, `3m 7s`.
pub fn format_duration(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let ms = (end - start).num_milliseconds().max(0);
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}

pub fn time_ago(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let s = (now - ts).num_seconds().max(0);
    if s < 60 {
        format!("{s}s ago")
    } else if s < 3600 {
        format!("{}m ago", s / 60)
    } else if s < 86_400 {
        format!("{}h ago", s / 3600)
    } else {
        format!("{}d ago", s / 86_400)
    }
}
