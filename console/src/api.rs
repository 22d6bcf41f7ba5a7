//! Collaborator backend interface.
//!
//! Shapes only; [`HttpApi`](crate::http::HttpApi) is the REST transport and
//! tests substitute an in-memory double.

use async_trait::async_trait;
use shared_types::{
    ChatSession, LogQuery, Message, MessageQuery, SendMessageResponse, SessionLog,
};

use crate::error::Result;

#[async_trait]
pub trait ConsoleApi: Send + Sync + 'static {
    /// Latest non-cron session, created on demand.
    async fn get_session(&self) -> Result<ChatSession>;

    /// Start a new logical thread.
    async fn reset_context(&self) -> Result<ChatSession>;

    /// Newest-window page, returned oldest first.
    async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<Message>>;

    /// The assistant message comes back `pending`.
    async fn send_message(&self, session_id: &str, content: &str) -> Result<SendMessageResponse>;

    async fn clear_history(&self) -> Result<()>;

    async fn get_log(&self, id: &str) -> Result<SessionLog>;

    /// Newest-window page of session logs.
    async fn list_logs(&self, query: &LogQuery) -> Result<Vec<SessionLog>>;

    async fn clear_logs(&self) -> Result<()>;
}
