//! Record model shared by the operator console and its web frontend
//!
//! These types are used by both:
//! - the Rust console (transcript reconciliation, terminal front end)
//! - the TypeScript frontend (via the generated bindings)
//!
//! Serializable with serde for JSON over HTTP, camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

// ============================================================================
// Ordering primitives
// ============================================================================

/// A server-assigned record with a stable identity and a creation time.
///
/// Merging and ordering only ever look at these two properties.
pub trait Record {
    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
}

// ============================================================================
// Chat
// ============================================================================

/// A logical conversation thread. Resetting context creates a new one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct ChatSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub enum MessageStatus {
    Pending,
    Complete,
    Error,
}

/// Chat message as returned by the collaborator backend.
///
/// `content`, `status` and `steps` change in place while the message is
/// pending; afterwards the record is frozen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_steps")]
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }
}

impl Record for Message {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub enum StepStatus {
    Running,
    Completed,
    Error,
}

/// A tool invocation performed by an agent while producing a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct Step {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub icon: String,
    /// Opaque argument blob, usually JSON produced by the model.
    #[serde(rename = "args", default)]
    pub args_payload: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Byte offset into the owning message's content after which the step ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Step {
    pub fn is_running(&self) -> bool {
        self.status == StepStatus::Running
    }

    /// Offset anchor, with zero treated the same as absent.
    pub fn anchor(&self) -> Option<usize> {
        self.content_offset.filter(|offset| *offset > 0)
    }
}

/// Body of `POST /chat/messages`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct SendMessageRequest {
    pub session_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct SendMessageResponse {
    pub user_message: Message,
    /// Returned in `pending` state; polling converges it.
    pub assistant_message: Message,
}

/// Newest-window query: `offset = 0` is the most recent `limit` records.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct MessageQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl MessageQuery {
    pub fn page(limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset,
            ..Default::default()
        }
    }

    /// The single most recent message of a session.
    pub fn latest_in(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            source: None,
            limit: 1,
            offset: 0,
        }
    }
}

// ============================================================================
// Session logs
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub enum LogEntryKind {
    Thought,
    Command,
    Output,
    Error,
    #[serde(other)]
    Other,
}

/// One append-only line of an agent execution trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogEntryKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub enum RunStatus {
    Running,
    Finished,
}

/// Raw execution trace of one agent run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct SessionLog {
    pub id: String,
    pub connection_id: String,
    pub agent_name: String,
    #[serde(default)]
    pub prompt: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default)]
    pub entries: Vec<LogEntry>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionLog {
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }
}

impl Record for SessionLog {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../frontend/src/types/generated.ts")]
pub struct LogQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

// ============================================================================
// Tolerant decoding
// ============================================================================

/// Decode `steps` one element at a time so a single malformed step (or a
/// non-array payload) never fails the owning message.
///
/// Producers sometimes ship the array JSON-encoded inside a string.
fn lenient_steps<'de, D>(deserializer: D) -> Result<Vec<Step>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let value = match raw {
        None | Some(serde_json::Value::Null) => return Ok(Vec::new()),
        Some(serde_json::Value::String(text)) => {
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(decoded) => decoded,
                Err(err) => {
                    tracing::warn!(error = %err, "discarding unparsable steps payload");
                    return Ok(Vec::new());
                }
            }
        }
        Some(other) => other,
    };

    let serde_json::Value::Array(items) = value else {
        tracing::warn!("discarding steps payload that is not an array");
        return Ok(Vec::new());
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Step>(item) {
            Ok(step) => Some(step),
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed step");
                None
            }
        })
        .collect())
}

/// Empty or unparsable timestamps decode as absent.
fn lenient_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|ts| ts.with_timezone(&Utc)))
}

// ============================================================================
// Tests
// ============================================================================
