//! Chat transcript controller.
//!
//! Holds the merged message list of the chat page, the active session id and
//! the poller converging the session's pending assistant reply. All record
//! mutation happens under one lock, including the poller's own apply step.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use shared_types::{Message, MessageQuery, SendMessageResponse};

use crate::api::ConsoleApi;
use crate::config::ConsoleConfig;
use crate::error::{ConsoleError, Result};
use crate::follow::{FollowState, Viewport};
use crate::grouping::{group_by_session, has_trailing_reset, layout, SessionGroup, TranscriptItem};
use crate::merge::{PagedList, Upsert};
use crate::poll::{PollSlot, PollTarget, PollTicket};

#[derive(Debug)]
struct ChatState {
    session_id: Option<String>,
    messages: PagedList<Message>,
    poll: PollSlot,
    /// Bumped by every history clear; pollers started before it are stale.
    cleared: u64,
    follow: FollowState,
}

impl ChatState {
    fn has_pending(&self) -> bool {
        let Some(session_id) = self.session_id.as_deref() else {
            return false;
        };
        self.messages
            .items()
            .iter()
            .any(|m| m.session_id == session_id && m.is_pending())
    }
}

fn lock(state: &Mutex<ChatState>) -> MutexGuard<'_, ChatState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owned copy of the transcript for rendering.
#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    pub session_id: Option<String>,
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub loading: bool,
    pub polling: bool,
}

impl ChatSnapshot {
    pub fn groups(&self) -> Vec<SessionGroup<'_>> {
        group_by_session(&self.messages)
    }

    pub fn has_trailing_reset(&self) -> bool {
        match self.session_id.as_deref() {
            Some(active) => has_trailing_reset(&self.groups(), active),
            None => false,
        }
    }

    pub fn layout(&self) -> Vec<TranscriptItem<'_>> {
        layout(&self.messages, self.session_id.as_deref().unwrap_or_default())
    }
}

pub struct ChatTranscript<A: ConsoleApi> {
    api: Arc<A>,
    config: ConsoleConfig,
    state: Arc<Mutex<ChatState>>,
}

impl<A: ConsoleApi> ChatTranscript<A> {
    pub fn new(api: Arc<A>, config: ConsoleConfig) -> Self {
        let state = ChatState {
            session_id: None,
            messages: PagedList::new(config.page_size),
            poll: PollSlot::default(),
            cleared: 0,
            follow: FollowState::new(config.follow_threshold),
        };
        Self {
            api,
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Fetch the active session and the newest page together.
    pub async fn load(&self) -> Result<()> {
        let query = MessageQuery::page(self.config.page_size, 0);
        let (session, page) =
            tokio::try_join!(self.api.get_session(), self.api.list_messages(&query))?;

        let mut state = lock(&self.state);
        tracing::info!(session_id = %session.id, messages = page.len(), "chat transcript loaded");
        state.session_id = Some(session.id);
        state.messages.replace(page);
        self.watch(&mut state);
        Ok(())
    }

    /// Backfill the next older page. Returns whether a page was applied.
    pub async fn load_more(&self) -> bool {
        let Some(request) = lock(&self.state).messages.begin_older() else {
            return false;
        };
        let page = self
            .api
            .list_messages(&MessageQuery::page(request.limit, request.offset))
            .await;

        let mut state = lock(&self.state);
        let applied = state.messages.finish_older(request, page);
        tracing::debug!(
            applied,
            held = state.messages.len(),
            has_more = state.messages.has_more(),
            "older messages"
        );
        applied
    }

    pub async fn send(&self, text: &str) -> Result<SendMessageResponse> {
        let content = text.trim();
        if content.is_empty() {
            return Err(ConsoleError::rejected("message is empty"));
        }
        let session_id = {
            let state = lock(&self.state);
            if state.has_pending() {
                return Err(ConsoleError::rejected("a reply is still pending"));
            }
            state
                .session_id
                .clone()
                .ok_or_else(|| ConsoleError::rejected("no active session"))?
        };

        let response = self.api.send_message(&session_id, content).await?;

        let mut state = lock(&self.state);
        state.messages.extend_known(vec![
            response.user_message.clone(),
            response.assistant_message.clone(),
        ]);
        state.follow.repin();
        self.watch(&mut state);
        Ok(response)
    }

    /// One immediate latest-record fetch for the active session.
    pub async fn refresh_now(&self) -> Result<()> {
        let Some(session_id) = self.session_id() else {
            return Ok(());
        };
        let latest = self
            .api
            .list_messages(&MessageQuery::latest_in(&session_id))
            .await?;

        let mut state = lock(&self.state);
        if let Some(message) = latest.into_iter().last() {
            state.messages.upsert_latest(message);
        }
        self.watch(&mut state);
        Ok(())
    }

    /// Start a new logical thread. A poller on the old session gets its
    /// trailing refresh and stops.
    pub async fn reset_context(&self) -> Result<String> {
        let session = self.api.reset_context().await?;

        let mut state = lock(&self.state);
        tracing::info!(
            previous = state.session_id.as_deref().unwrap_or("-"),
            session_id = %session.id,
            "chat context reset"
        );
        state.session_id = Some(session.id.clone());
        state.poll.settle();
        Ok(session.id)
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.api.clear_history().await?;
        {
            let mut state = lock(&self.state);
            state.poll.cancel();
            state.messages.clear();
            state.follow.reset();
            state.cleared += 1;
        }
        tracing::info!("chat history cleared");

        let session = self.api.get_session().await?;
        lock(&self.state).session_id = Some(session.id);
        Ok(())
    }

    pub fn session_id(&self) -> Option<String> {
        lock(&self.state).session_id.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.state).messages.items().to_vec()
    }

    pub fn has_pending(&self) -> bool {
        lock(&self.state).has_pending()
    }

    pub fn has_more(&self) -> bool {
        lock(&self.state).messages.has_more()
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.state).poll.is_polling()
    }

    pub fn on_scroll(&self, viewport: Viewport) {
        lock(&self.state).follow.on_scroll(viewport);
    }

    /// Whether the view should jump to the bottom for messages that arrived
    /// since the last call.
    pub fn should_follow(&self) -> bool {
        let mut state = lock(&self.state);
        let len = state.messages.len();
        state.follow.on_content(len)
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        let state = lock(&self.state);
        ChatSnapshot {
            session_id: state.session_id.clone(),
            messages: state.messages.items().to_vec(),
            has_more: state.messages.has_more(),
            loading: state.messages.is_loading(),
            polling: state.poll.is_polling(),
        }
    }

    /// Start polling when the active session has a pending message.
    fn watch(&self, state: &mut ChatState) {
        if !state.has_pending() {
            return;
        }
        let Some(session_id) = state.session_id.clone() else {
            return;
        };
        let api = self.api.clone();
        let shared = self.state.clone();
        let cleared = state.cleared;
        let key = session_id.clone();
        let started = state
            .poll
            .ensure(&key, self.config.chat_poll_interval, move |ticket| {
                SessionPoll {
                    api,
                    state: shared,
                    session_id,
                    ticket,
                    cleared,
                }
            });
        if started {
            tracing::debug!(session_id = %key, "polling pending reply");
        }
    }
}

impl<A: ConsoleApi> Drop for ChatTranscript<A> {
    fn drop(&mut self) {
        lock(&self.state).poll.cancel();
    }
}

/// Latest record of one session, applied by identity.
struct SessionPoll<A: ConsoleApi> {
    api: Arc<A>,
    state: Arc<Mutex<ChatState>>,
    session_id: String,
    ticket: PollTicket,
    cleared: u64,
}

#[async_trait]
impl<A: ConsoleApi> PollTarget for SessionPoll<A> {
    type Snapshot = Message;

    fn key(&self) -> &str {
        &self.session_id
    }

    async fn fetch(&self) -> Result<Option<Message>> {
        let latest = self
            .api
            .list_messages(&MessageQuery::latest_in(&self.session_id))
            .await?;
        Ok(latest.into_iter().last())
    }

    fn apply(&self, message: Message) -> bool {
        let mut state = lock(&self.state);
        if state.cleared != self.cleared {
            tracing::debug!(session_id = %self.session_id, "discarding poll result after clear");
            return false;
        }

        let status = message.status;
        if state.messages.upsert_latest(message) == Upsert::Inserted {
            tracing::debug!(session_id = %self.session_id, "poll picked up a new message");
        }

        let watching = state.session_id.as_deref() == Some(self.session_id.as_str());
        let holds = watching && state.has_pending();
        if !holds {
            tracing::debug!(session_id = %self.session_id, ?status, "pending reply converged");
            state.poll.release(self.ticket);
        }
        holds
    }
}
