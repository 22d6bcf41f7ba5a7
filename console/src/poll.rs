//! Condition-bound periodic refresh of a single watched record.
//!
//! State machine per target:
//!
//! ```text
//!   Idle --ensure--> Polling --snapshot says "done"--> Idle   (that fetch was terminal)
//!                    Polling --settle--> one trailing fetch --> Idle
//!                    Polling --cancel/drop--> Idle            (in-flight result discarded)
//! ```
//!
//! Each refresh is awaited inside the timer loop, so two refreshes for the
//! same target never overlap; ticks that elapse meanwhile are skipped. A
//! settle that arrives while a refresh is in flight takes effect once it
//! returns, whatever that response said.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Something a poller can refresh.
#[async_trait]
pub trait PollTarget: Send + Sync + 'static {
    type Snapshot: Send + 'static;

    /// Identity of the watched record, for logging.
    fn key(&self) -> &str;

    /// Fetch the latest snapshot. `Ok(None)` means nothing to apply yet.
    async fn fetch(&self) -> Result<Option<Self::Snapshot>>;

    /// Apply a snapshot and report whether the watched condition still holds.
    fn apply(&self, snapshot: Self::Snapshot) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
}

/// Why a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// A fetched snapshot no longer satisfied the condition.
    Converged,
    /// The condition was cleared externally and the trailing fetch ran.
    Settled,
    Cancelled,
}

/// Handle to one running poll loop. Dropping it cancels the loop unless it
/// was detached.
#[derive(Debug)]
pub struct Poller {
    key: String,
    cancel: CancellationToken,
    settle: Arc<Settle>,
    task: Option<JoinHandle<PollExit>>,
    detached: bool,
}

/// Settle request. The flag outlives the notification so a request that
/// lands while a refresh is in flight is still honored once it returns.
#[derive(Debug, Default)]
struct Settle {
    requested: AtomicBool,
    notify: Notify,
}

impl Settle {
    fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

impl Poller {
    pub fn spawn<T: PollTarget>(target: Arc<T>, interval: Duration) -> Self {
        let key = target.key().to_string();
        let cancel = CancellationToken::new();
        let settle = Arc::new(Settle::default());
        tracing::debug!(key = %key, interval_ms = interval.as_millis() as u64, "poller started");
        let task = tokio::spawn(run(target, interval, cancel.clone(), settle.clone()));
        Self {
            key,
            cancel,
            settle,
            task: Some(task),
            detached: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_finished(&self) -> bool {
        self.cancel.is_cancelled() || self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Clear the timer and perform exactly one trailing refresh.
    pub fn settle(&self) {
        self.settle.request();
    }

    /// Tear down now; any in-flight refresh is abandoned.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Let the loop run to its own end without holding a handle to it.
    pub fn detach(mut self) {
        self.detached = true;
    }

    /// Wait for the loop to end.
    pub async fn join(&mut self) -> PollExit {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(PollExit::Cancelled),
            None => PollExit::Cancelled,
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if !self.detached {
            self.cancel.cancel();
        }
    }
}

async fn run<T: PollTarget>(
    target: Arc<T>,
    period: Duration,
    cancel: CancellationToken,
    settle: Arc<Settle>,
) -> PollExit {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks: u64 = 0;

    let exit = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break PollExit::Cancelled,
            _ = settle.notify.notified() => break trailing(target.as_ref(), &cancel).await,
            _ = ticker.tick() => {
                ticks += 1;
                tracing::trace!(key = target.key(), ticks, "poll tick");
                match refresh(target.as_ref(), &cancel).await {
                    None => break PollExit::Cancelled,
                    // Settled while this tick's request was in flight; its
                    // response predates the transition.
                    Some(_) if settle.is_requested() => {
                        break trailing(target.as_ref(), &cancel).await
                    }
                    Some(false) => break PollExit::Converged,
                    Some(true) => {}
                }
            }
        }
    };

    tracing::debug!(key = target.key(), ticks, ?exit, "poller stopped");
    exit
}

async fn trailing<T: PollTarget>(target: &T, cancel: &CancellationToken) -> PollExit {
    tracing::debug!(key = target.key(), "condition cleared, trailing refresh");
    match refresh(target, cancel).await {
        None => PollExit::Cancelled,
        Some(_) => PollExit::Settled,
    }
}

/// One guarded refresh. `None` when cancelled before the result could be
/// applied, otherwise whether the condition still holds.
async fn refresh<T: PollTarget>(target: &T, cancel: &CancellationToken) -> Option<bool> {
    let fetched = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        fetched = target.fetch() => fetched,
    };
    if cancel.is_cancelled() {
        return None;
    }
    match fetched {
        Ok(Some(snapshot)) => Some(target.apply(snapshot)),
        Ok(None) => Some(true),
        Err(err) if err.is_transient() => {
            tracing::warn!(key = target.key(), error = %err, "poll refresh failed, retrying");
            Some(true)
        }
        Err(err) => {
            tracing::error!(key = target.key(), error = %err, "poll refresh rejected, retrying");
            Some(true)
        }
    }
}

/// Issued to a target so it can release its own slot when it converges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTicket(u64);

/// Holds at most one live poller for a watched target.
///
/// Lives inside the state the target mutates, so "the condition no longer
/// holds" and "a new pending record appeared" are decided under one lock.
#[derive(Debug, Default)]
pub struct PollSlot {
    current: Option<(PollTicket, Poller)>,
    issued: u64,
}

impl PollSlot {
    pub fn state(&self) -> PollState {
        match &self.current {
            Some((_, poller)) if !poller.is_finished() => PollState::Polling,
            _ => PollState::Idle,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.state() == PollState::Polling
    }

    pub fn key(&self) -> Option<&str> {
        self.current.as_ref().map(|(_, poller)| poller.key())
    }

    /// Start polling `key` unless it is already being polled. Returns whether
    /// a new poller was spawned.
    pub fn ensure<T, F>(&mut self, key: &str, interval: Duration, make_target: F) -> bool
    where
        T: PollTarget,
        F: FnOnce(PollTicket) -> T,
    {
        if self.is_polling() && self.key() == Some(key) {
            return false;
        }
        self.cancel();
        self.issued += 1;
        let ticket = PollTicket(self.issued);
        let poller = Poller::spawn(Arc::new(make_target(ticket)), interval);
        self.current = Some((ticket, poller));
        true
    }

    /// Forget the poller holding `ticket`; its loop is already ending.
    pub fn release(&mut self, ticket: PollTicket) {
        if let Some((held, _)) = &self.current {
            if *held == ticket {
                if let Some((_, poller)) = self.current.take() {
                    poller.detach();
                }
            }
        }
    }

    /// The condition was cleared from outside: one trailing refresh, then stop.
    pub fn settle(&mut self) {
        if let Some((_, poller)) = self.current.take() {
            if !poller.is_finished() {
                poller.settle();
            }
            poller.detach();
        }
    }

    pub fn cancel(&mut self) {
        if let Some((_, poller)) = self.current.take() {
            poller.cancel();
        }
    }
}
