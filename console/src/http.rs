//! REST transport for [`ConsoleApi`].

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use shared_types::{
    ChatSession, LogQuery, Message, MessageQuery, SendMessageRequest, SendMessageResponse,
    SessionLog,
};

use crate::api::ConsoleApi;
use crate::error::{ConsoleError, Result};

#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base: Url,
}

impl HttpApi {
    pub fn new(api_url: &str) -> Result<Self> {
        let base = Url::parse(api_url)
            .map_err(|e| ConsoleError::Config(format!("invalid API URL {api_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ConsoleError::Config(format!(
                "API URL {api_url} cannot carry a path"
            )));
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Error text from a problem-details body (`title`, then `detail`, `error`,
/// `message`), else the raw body, else the status line.
async fn describe_http_error(response: Response) -> ConsoleError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("error").to_string()
    } else {
        serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|json| {
                ["title", "detail", "error", "message"]
                    .iter()
                    .find_map(|key| json.get(*key).and_then(|v| v.as_str()).map(str::to_string))
            })
            .unwrap_or(body)
    };
    ConsoleError::Http {
        status: status.as_u16(),
        message,
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(describe_http_error(response).await)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = ensure_success(response).await?;
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl ConsoleApi for HttpApi {
    async fn get_session(&self) -> Result<ChatSession> {
        let response = self
            .client
            .get(self.endpoint(&["chat", "session"]))
            .send()
            .await?;
        read_json(response).await
    }

    async fn reset_context(&self) -> Result<ChatSession> {
        let response = self
            .client
            .post(self.endpoint(&["chat", "reset"]))
            .send()
            .await?;
        read_json(response).await
    }

    async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<Message>> {
        let response = self
            .client
            .get(self.endpoint(&["chat", "messages"]))
            .query(query)
            .send()
            .await?;
        read_json(response).await
    }

    async fn send_message(&self, session_id: &str, content: &str) -> Result<SendMessageResponse> {
        let request = SendMessageRequest {
            session_id: session_id.to_string(),
            content: content.to_string(),
        };
        let response = self
            .client
            .post(self.endpoint(&["chat", "messages"]))
            .json(&request)
            .send()
            .await?;
        read_json(response).await
    }

    async fn clear_history(&self) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&["chat", "history"]))
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    async fn get_log(&self, id: &str) -> Result<SessionLog> {
        let response = self
            .client
            .get(self.endpoint(&["session-logs", id]))
            .send()
            .await?;
        read_json(response).await
    }

    async fn list_logs(&self, query: &LogQuery) -> Result<Vec<SessionLog>> {
        let response = self
            .client
            .get(self.endpoint(&["session-logs"]))
            .query(query)
            .send()
            .await?;
        read_json(response).await
    }

    async fn clear_logs(&self) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&["session-logs"]))
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }
}
