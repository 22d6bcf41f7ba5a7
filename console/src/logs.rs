//! Session-log feed for the logs page.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use shared_types::{LogQuery, SessionLog};

use crate::api::ConsoleApi;
use crate::config::ConsoleConfig;
use crate::error::Result;
use crate::merge::PagedList;
use crate::poll::{PollSlot, PollTarget};

#[derive(Debug)]
struct FeedState {
    connection_id: Option<String>,
    logs: PagedList<SessionLog>,
    expanded: Option<String>,
    refresher: PollSlot,
    /// Bumped whenever the held list is superseded (filter change, clear).
    generation: u64,
}

fn lock(state: &Mutex<FeedState>) -> MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct LogFeed<A: ConsoleApi> {
    api: Arc<A>,
    config: ConsoleConfig,
    state: Arc<Mutex<FeedState>>,
}

impl<A: ConsoleApi> LogFeed<A> {
    pub fn new(api: Arc<A>, config: ConsoleConfig, connection_id: Option<String>) -> Self {
        let state = FeedState {
            connection_id,
            logs: PagedList::new(config.page_size),
            expanded: None,
            refresher: PollSlot::default(),
            generation: 0,
        };
        Self {
            api,
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Load the newest page and keep it fresh in the background. A failed
    /// load leaves an empty feed.
    pub async fn load(&self) -> Result<()> {
        let (query, generation) = {
            let state = lock(&self.state);
            (self.newest_query(&state), state.generation)
        };
        let fetched = self.api.list_logs(&query).await;

        let mut state = lock(&self.state);
        if state.generation != generation {
            tracing::debug!("discarding log page for a superseded filter");
            return Ok(());
        }
        match fetched {
            Ok(page) => {
                tracing::info!(
                    connection_id = query.connection_id.as_deref().unwrap_or("*"),
                    logs = page.len(),
                    "log feed loaded"
                );
                state.logs.replace(page);
                self.start_refresh(&mut state);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "log feed load failed");
                state.logs.clear();
                Err(err)
            }
        }
    }

    pub async fn load_more(&self) -> bool {
        let (request, connection_id) = {
            let mut state = lock(&self.state);
            match state.logs.begin_older() {
                Some(request) => (request, state.connection_id.clone()),
                None => return false,
            }
        };
        let query = LogQuery {
            connection_id,
            limit: request.limit,
            offset: request.offset,
        };
        let page = self.api.list_logs(&query).await;
        lock(&self.state).logs.finish_older(request, page)
    }

    /// Switch the connection filter and reload.
    pub async fn set_connection(&self, connection_id: Option<String>) -> Result<()> {
        {
            let mut state = lock(&self.state);
            state.refresher.cancel();
            state.generation += 1;
            state.connection_id = connection_id;
            state.expanded = None;
            state.logs.clear();
        }
        self.load().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.api.clear_logs().await?;

        let mut state = lock(&self.state);
        state.refresher.cancel();
        state.generation += 1;
        state.expanded = None;
        state.logs.clear();
        self.start_refresh(&mut state);
        tracing::info!("session logs cleared");
        Ok(())
    }

    /// Stop background refresh; the held list stays readable.
    pub fn close(&self) {
        lock(&self.state).refresher.cancel();
    }

    /// Expand `id`, or collapse it if it already is. Returns the new state.
    pub fn toggle_expanded(&self, id: &str) -> bool {
        let mut state = lock(&self.state);
        if state.expanded.as_deref() == Some(id) {
            state.expanded = None;
            false
        } else {
            state.expanded = Some(id.to_string());
            true
        }
    }

    pub fn expanded(&self) -> Option<String> {
        lock(&self.state).expanded.clone()
    }

    pub fn connection_id(&self) -> Option<String> {
        lock(&self.state).connection_id.clone()
    }

    /// Oldest first.
    pub fn items(&self) -> Vec<SessionLog> {
        lock(&self.state).logs.items().to_vec()
    }

    pub fn newest_first(&self) -> Vec<SessionLog> {
        lock(&self.state).logs.items().iter().rev().cloned().collect()
    }

    pub fn has_more(&self) -> bool {
        lock(&self.state).logs.has_more()
    }

    pub fn is_refreshing(&self) -> bool {
        lock(&self.state).refresher.is_polling()
    }

    fn newest_query(&self, state: &FeedState) -> LogQuery {
        LogQuery {
            connection_id: state.connection_id.clone(),
            limit: self.config.page_size,
            offset: 0,
        }
    }

    fn start_refresh(&self, state: &mut FeedState) {
        let key = format!("feed:{}", state.connection_id.as_deref().unwrap_or("*"));
        let target = FeedRefresh {
            api: self.api.clone(),
            state: self.state.clone(),
            query: self.newest_query(state),
            generation: state.generation,
            key: key.clone(),
        };
        state
            .refresher
            .ensure(&key, self.config.feed_refresh_interval, move |_| target);
    }
}

impl<A: ConsoleApi> Drop for LogFeed<A> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Re-fetch of the newest window; runs for as long as the feed is open.
struct FeedRefresh<A: ConsoleApi> {
    api: Arc<A>,
    state: Arc<Mutex<FeedState>>,
    query: LogQuery,
    generation: u64,
    key: String,
}

#[async_trait]
impl<A: ConsoleApi> PollTarget for FeedRefresh<A> {
    type Snapshot = Vec<SessionLog>;

    fn key(&self) -> &str {
        &self.key
    }

    async fn fetch(&self) -> Result<Option<Vec<SessionLog>>> {
        Ok(Some(self.api.list_logs(&self.query).await?))
    }

    fn apply(&self, page: Vec<SessionLog>) -> bool {
        let mut state = lock(&self.state);
        if state.generation != self.generation {
            return false;
        }
        tracing::trace!(key = %self.key, logs = page.len(), "log feed refreshed");
        state.logs.refresh_newest(page);
        true
    }
}
