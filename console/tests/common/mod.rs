//! In-memory stand-in for the platform API.
//!
//! Implements the same newest-window pagination as the real backend and
//! counts every call so tests can assert on request traffic.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use operator_console::{ConsoleApi, ConsoleConfig, ConsoleError, Result};
use shared_types::{
    ChatSession, LogEntry, LogEntryKind, LogQuery, Message, MessageQuery, MessageStatus, Role,
    RunStatus, SendMessageResponse, SessionLog,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::seconds(seconds)
}

pub fn test_config() -> ConsoleConfig {
    ConsoleConfig::default()
}

pub fn message(id: &str, session: &str, seconds: i64) -> Message {
    Message {
        id: id.to_string(),
        session_id: session.to_string(),
        role: Role::User,
        content: format!("message {id}"),
        status: MessageStatus::Complete,
        source: None,
        model_name: None,
        steps: Vec::new(),
        created_at: at(seconds),
    }
}

pub fn session_log(id: &str, connection: &str, seconds: i64, status: RunStatus) -> SessionLog {
    SessionLog {
        id: id.to_string(),
        connection_id: connection.to_string(),
        agent_name: "ops-agent".to_string(),
        prompt: format!("run {id}"),
        status,
        message_id: None,
        step_id: None,
        model_name: None,
        entries: Vec::new(),
        started_at: at(seconds),
        finished_at: None,
    }
}

/// How a watched log evolves across `get_log` calls.
#[derive(Debug, Clone, Default)]
pub struct LogScript {
    /// Mark finished on this fetch (1-based); `None` runs forever.
    pub finish_on: Option<usize>,
    /// Every fetch appends one entry.
    pub grow: bool,
    pub delay: Duration,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub session: Option<ChatSession>,
    pub sessions_created: usize,
    pub messages: Vec<Message>,
    pub logs: Vec<SessionLog>,

    /// Complete pending messages on this latest-record fetch (1-based).
    pub complete_on_latest: Option<usize>,
    pub latest_fetches: usize,
    /// The latest-record response is read first, then delivered this late.
    pub latest_delay: Duration,
    pub page_fetches: usize,
    pub fail_pages_from_offset: Option<usize>,
    pub fail_send: bool,
    pub fail_logs: bool,

    pub log_scripts: HashMap<String, LogScript>,
    pub log_fetches: HashMap<String, usize>,
    pub log_list_fetches: usize,
}

#[derive(Debug, Default)]
pub struct MockApi {
    state: Mutex<MockState>,
}

impl MockApi {
    pub fn new() -> Self {
        let api = Self::default();
        api.state().session = Some(ChatSession {
            id: "s1".to_string(),
            created_at: t0(),
        });
        api
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn latest_fetches(&self) -> usize {
        self.state().latest_fetches
    }

    pub fn log_fetches(&self, id: &str) -> usize {
        self.state().log_fetches.get(id).copied().unwrap_or(0)
    }

    fn read_messages(&self, query: &MessageQuery) -> (Result<Vec<Message>>, Duration) {
        let mut state = self.state();
        let latest = query.session_id.is_some() && query.limit == 1 && query.offset == 0;
        let delay = if latest { state.latest_delay } else { Duration::ZERO };
        if latest {
            state.latest_fetches += 1;
            if state.complete_on_latest == Some(state.latest_fetches) {
                for message in state.messages.iter_mut().filter(|m| m.is_pending()) {
                    message.status = MessageStatus::Complete;
                    message.content = "Checking disk usage. Done.".to_string();
                }
            }
        } else {
            state.page_fetches += 1;
            if state
                .fail_pages_from_offset
                .is_some_and(|from| query.offset >= from)
            {
                let err = ConsoleError::Http {
                    status: 502,
                    message: "Bad Gateway".to_string(),
                };
                return (Err(err), delay);
            }
        }

        let matching: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| query.session_id.as_deref().map_or(true, |s| m.session_id == s))
            .cloned()
            .collect();
        (Ok(window(&matching, query.limit, query.offset)), delay)
    }

    fn next_time(state: &MockState) -> DateTime<Utc> {
        let newest = state.messages.iter().map(|m| m.created_at).max();
        newest.map_or(t0(), |ts| ts + chrono::Duration::seconds(1))
    }
}

/// Newest-window slice of an oldest-first list.
fn window<T: Clone>(items: &[T], limit: usize, offset: usize) -> Vec<T> {
    let end = items.len().saturating_sub(offset);
    let start = end.saturating_sub(limit);
    items[start..end].to_vec()
}

#[async_trait]
impl ConsoleApi for MockApi {
    async fn get_session(&self) -> Result<ChatSession> {
        let mut state = self.state();
        if let Some(session) = state.session.clone() {
            return Ok(session);
        }
        state.sessions_created += 1;
        let session = ChatSession {
            id: format!("s{}", state.sessions_created + 1),
            created_at: Utc::now(),
        };
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn reset_context(&self) -> Result<ChatSession> {
        let mut state = self.state();
        state.sessions_created += 1;
        let session = ChatSession {
            id: format!("s{}", state.sessions_created + 1),
            created_at: Utc::now(),
        };
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<Message>> {
        let (page, delay) = self.read_messages(query);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        page
    }

    async fn send_message(&self, session_id: &str, content: &str) -> Result<SendMessageResponse> {
        let mut state = self.state();
        if state.fail_send {
            return Err(ConsoleError::Transport("connection refused".to_string()));
        }
        let created = Self::next_time(&state);
        let n = state.messages.len();
        let user_message = Message {
            id: format!("u{n}"),
            content: content.to_string(),
            created_at: created,
            ..message("", session_id, 0)
        };
        let assistant_message = Message {
            id: format!("a{n}"),
            role: Role::Assistant,
            content: String::new(),
            status: MessageStatus::Pending,
            created_at: created + chrono::Duration::seconds(1),
            ..message("", session_id, 0)
        };
        state.messages.push(user_message.clone());
        state.messages.push(assistant_message.clone());
        Ok(SendMessageResponse {
            user_message,
            assistant_message,
        })
    }

    async fn clear_history(&self) -> Result<()> {
        self.state().messages.clear();
        Ok(())
    }

    async fn get_log(&self, id: &str) -> Result<SessionLog> {
        let (script, fetch) = {
            let mut state = self.state();
            let fetch = {
                let count = state.log_fetches.entry(id.to_string()).or_insert(0);
                *count += 1;
                *count
            };
            (state.log_scripts.get(id).cloned().unwrap_or_default(), fetch)
        };
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        let mut state = self.state();
        let log = state
            .logs
            .iter_mut()
            .find(|log| log.id == id)
            .ok_or_else(|| ConsoleError::Http {
                status: 404,
                message: "session log not found".to_string(),
            })?;
        if script.grow {
            log.entries.push(LogEntry {
                kind: LogEntryKind::Output,
                content: format!("line {fetch}"),
                timestamp: log.started_at + chrono::Duration::seconds(fetch as i64),
            });
        }
        if script.finish_on == Some(fetch) {
            log.status = RunStatus::Finished;
            log.finished_at = Some(log.started_at + chrono::Duration::seconds(fetch as i64));
        }
        Ok(log.clone())
    }

    async fn list_logs(&self, query: &LogQuery) -> Result<Vec<SessionLog>> {
        let mut state = self.state();
        state.log_list_fetches += 1;
        if state.fail_logs {
            return Err(ConsoleError::Transport("connection reset".to_string()));
        }
        let matching: Vec<SessionLog> = state
            .logs
            .iter()
            .filter(|log| {
                query
                    .connection_id
                    .as_deref()
                    .map_or(true, |c| log.connection_id == c)
            })
            .cloned()
            .collect();
        Ok(window(&matching, query.limit, query.offset))
    }

    async fn clear_logs(&self) -> Result<()> {
        self.state().logs.clear();
        Ok(())
    }
}
