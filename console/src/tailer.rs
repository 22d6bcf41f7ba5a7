//! Live view of one execution trace.
//!
//! Every fetch captures the selection generation at request time; a response
//! whose generation no longer matches is dropped, so switching logs can never
//! show the previous log's entries.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{LogEntry, SessionLog, Step};

use crate::api::ConsoleApi;
use crate::config::ConsoleConfig;
use crate::error::Result;
use crate::follow::{FollowState, Viewport};
use crate::payload::step_entries;
use crate::poll::{PollSlot, PollTarget, PollTicket};

#[derive(Debug)]
struct TailState {
    log_id: Option<String>,
    step: Option<Step>,
    log: Option<SessionLog>,
    /// Keep polling even after the log reports finished (the owning step is
    /// still running).
    live: bool,
    generation: u64,
    poll: PollSlot,
    follow: FollowState,
}

impl TailState {
    fn holds(&self) -> bool {
        self.live || self.log.as_ref().is_some_and(SessionLog::is_running)
    }
}

fn lock(state: &Mutex<TailState>) -> MutexGuard<'_, TailState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct LogTailer<A: ConsoleApi> {
    api: Arc<A>,
    config: ConsoleConfig,
    state: Arc<Mutex<TailState>>,
}

impl<A: ConsoleApi> LogTailer<A> {
    pub fn new(api: Arc<A>, config: ConsoleConfig) -> Self {
        let state = TailState {
            log_id: None,
            step: None,
            log: None,
            live: false,
            generation: 0,
            poll: PollSlot::default(),
            follow: FollowState::new(config.follow_threshold),
        };
        Self {
            api,
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Show `log_id`, replacing whatever was open. Returns false when the
    /// response arrived after another selection superseded it.
    pub async fn open(&self, log_id: &str, live: bool) -> Result<bool> {
        self.show(log_id, live, None).await
    }

    /// Open the trace behind a step. Steps without one show synthesized
    /// entries only.
    pub async fn select_step(&self, step: &Step) -> Result<bool> {
        match step.log_id.as_deref() {
            Some(log_id) => {
                self.show(log_id, step.is_running(), Some(step.clone()))
                    .await
            }
            None => {
                self.close();
                lock(&self.state).step = Some(step.clone());
                Ok(false)
            }
        }
    }

    async fn show(&self, log_id: &str, live: bool, step: Option<Step>) -> Result<bool> {
        let generation = {
            let mut state = lock(&self.state);
            state.poll.cancel();
            state.generation += 1;
            state.log_id = Some(log_id.to_string());
            state.step = step;
            state.log = None;
            state.live = live;
            state.follow.reset();
            state.generation
        };
        let fetched = self.api.get_log(log_id).await;

        let mut state = lock(&self.state);
        if state.generation != generation {
            tracing::debug!(log_id, "discarding log for a superseded selection");
            return Ok(false);
        }
        let log = fetched?;
        tracing::debug!(log_id, entries = log.entries.len(), status = ?log.status, "log opened");
        state.log = Some(log);
        if state.holds() {
            self.attach(&mut state, log_id, generation);
        }
        Ok(true)
    }

    /// The selected step changed upstream. Once it stops running the poller
    /// gets one trailing refresh and stops.
    pub fn step_updated(&self, step: &Step) {
        let mut state = lock(&self.state);
        if state.step.as_ref().map(|s| s.id.as_str()) != Some(step.id.as_str()) {
            return;
        }
        let finished = !step.is_running();
        state.step = Some(step.clone());
        if finished && state.live {
            state.live = false;
            state.poll.settle();
        }
    }

    pub fn close(&self) {
        let mut state = lock(&self.state);
        state.poll.cancel();
        state.generation += 1;
        state.log_id = None;
        state.step = None;
        state.log = None;
        state.live = false;
        state.follow.reset();
    }

    pub fn log_id(&self) -> Option<String> {
        lock(&self.state).log_id.clone()
    }

    pub fn log(&self) -> Option<SessionLog> {
        lock(&self.state).log.clone()
    }

    /// Entries of the open log, or lines synthesized from the selected step.
    pub fn entries(&self, now: DateTime<Utc>) -> Vec<LogEntry> {
        let state = lock(&self.state);
        match (&state.log, &state.step) {
            (Some(log), _) => log.entries.clone(),
            (None, Some(step)) => step_entries(step, now),
            (None, None) => Vec::new(),
        }
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.state).poll.is_polling()
    }

    pub fn on_scroll(&self, viewport: Viewport) {
        lock(&self.state).follow.on_scroll(viewport);
    }

    /// Whether the view should jump to the bottom for entries that arrived
    /// since the last call.
    pub fn should_follow(&self) -> bool {
        let mut state = lock(&self.state);
        let len = state.log.as_ref().map_or(0, |log| log.entries.len());
        state.follow.on_content(len)
    }

    fn attach(&self, state: &mut TailState, log_id: &str, generation: u64) {
        let api = self.api.clone();
        let shared = self.state.clone();
        let id = log_id.to_string();
        state
            .poll
            .ensure(log_id, self.config.log_poll_interval, move |ticket| TailPoll {
                api,
                state: shared,
                log_id: id,
                generation,
                ticket,
            });
    }
}

impl<A: ConsoleApi> Drop for LogTailer<A> {
    fn drop(&mut self) {
        lock(&self.state).poll.cancel();
    }
}

struct TailPoll<A: ConsoleApi> {
    api: Arc<A>,
    state: Arc<Mutex<TailState>>,
    log_id: String,
    generation: u64,
    ticket: PollTicket,
}

#[async_trait]
impl<A: ConsoleApi> PollTarget for TailPoll<A> {
    type Snapshot = SessionLog;

    fn key(&self) -> &str {
        &self.log_id
    }

    async fn fetch(&self) -> Result<Option<SessionLog>> {
        Ok(Some(self.api.get_log(&self.log_id).await?))
    }

    fn apply(&self, mut log: SessionLog) -> bool {
        let mut state = lock(&self.state);
        if state.generation != self.generation {
            tracing::debug!(log_id = %self.log_id, "discarding stale log refresh");
            return false;
        }
        if let Some(held) = state.log.take() {
            if log.entries.len() < held.entries.len() {
                tracing::warn!(
                    log_id = %self.log_id,
                    held = held.entries.len(),
                    fetched = log.entries.len(),
                    "log refresh went backwards, keeping held entries"
                );
                log.entries = held.entries;
            }
        }
        state.log = Some(log);

        let holds = state.holds();
        if !holds {
            tracing::debug!(log_id = %self.log_id, "log finished");
            state.poll.release(self.ticket);
        }
        holds
    }
}
