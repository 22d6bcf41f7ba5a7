//! Identity-keyed merging of fetched pages into a held, time-ordered list.
//!
//! Every mutation of a held list goes through [`merge`] or
//! [`upsert_latest`]; both are idempotent, so two racing refreshes of the
//! same target settle on whichever applied last.

use std::collections::HashMap;

use shared_types::Record;

/// Which side of the held list a page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Backfill of history. Held copies win: a record already being polled
    /// locally is never clobbered by a staler page.
    Older,
    /// Re-fetch of the newest window. Fetched copies are the source of truth.
    Newer,
}

/// Merge `incoming` into `existing` by identity, sorted by creation time.
///
/// Ties on creation time keep first-observation order: held records before
/// newly seen ones, newly seen ones in page order.
pub fn merge<R>(existing: &[R], incoming: Vec<R>, direction: Direction) -> Vec<R>
where
    R: Record + Clone,
{
    let mut merged: Vec<R> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(merged.capacity());

    for record in existing {
        match index.get(record.id()) {
            Some(&slot) => merged[slot] = record.clone(),
            None => {
                index.insert(record.id().to_string(), merged.len());
                merged.push(record.clone());
            }
        }
    }

    for record in incoming {
        match index.get(record.id()) {
            Some(&slot) => {
                if direction == Direction::Newer {
                    merged[slot] = record;
                }
            }
            None => {
                index.insert(record.id().to_string(), merged.len());
                merged.push(record);
            }
        }
    }

    merged.sort_by_key(|record| record.created_at());
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// Apply the freshly fetched latest record: overwrite the held copy in
/// place, or insert it at its chronological position.
pub fn upsert_latest<R>(list: &mut Vec<R>, record: R) -> Upsert
where
    R: Record,
{
    if let Some(held) = list.iter_mut().find(|held| held.id() == record.id()) {
        *held = record;
        return Upsert::Updated;
    }

    let created_at = record.created_at();
    let position = list.partition_point(|held| held.created_at() <= created_at);
    list.insert(position, record);
    Upsert::Inserted
}

/// Window of an older-page request, counted back from the newest record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
    epoch: u64,
}

/// A held record list together with its newest-window pagination state.
#[derive(Debug, Clone)]
pub struct PagedList<R> {
    items: Vec<R>,
    page_size: usize,
    has_more: bool,
    loading: bool,
    epoch: u64,
}

impl<R> PagedList<R>
where
    R: Record + Clone,
{
    pub fn new(page_size: usize) -> Self {
        Self {
            items: Vec::new(),
            page_size: page_size.max(1),
            has_more: false,
            loading: false,
            epoch: 0,
        }
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Replace everything with a freshly loaded newest page.
    pub fn replace(&mut self, first_page: Vec<R>) {
        self.epoch += 1;
        self.loading = false;
        self.has_more = first_page.len() >= self.page_size;
        self.items = merge(&[], first_page, Direction::Newer);
    }

    /// Drop all records and stop offering further pages.
    pub fn clear(&mut self) {
        self.epoch += 1;
        self.loading = false;
        self.has_more = false;
        self.items.clear();
    }

    /// Reserve the next older page. `None` while a load is in flight or
    /// once history is exhausted.
    pub fn begin_older(&mut self) -> Option<PageRequest> {
        if self.loading || !self.has_more {
            return None;
        }
        self.loading = true;
        Some(PageRequest {
            limit: self.page_size,
            offset: self.items.len(),
            epoch: self.epoch,
        })
    }

    /// Complete an older-page load. A failure or a short page clears
    /// `has_more`; a response for a superseded list is dropped.
    pub fn finish_older<E>(&mut self, request: PageRequest, page: Result<Vec<R>, E>) -> bool
    where
        E: std::fmt::Display,
    {
        if request.epoch != self.epoch {
            tracing::debug!("discarding page for a superseded list");
            return false;
        }
        self.loading = false;
        match page {
            Ok(page) => {
                if page.len() < request.limit {
                    self.has_more = false;
                }
                if !page.is_empty() {
                    self.items = merge(&self.items, page, Direction::Older);
                }
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, offset = request.offset, "page load failed");
                self.has_more = false;
                false
            }
        }
    }

    /// Overlay a re-fetched newest window.
    pub fn refresh_newest(&mut self, page: Vec<R>) {
        self.items = merge(&self.items, page, Direction::Newer);
    }

    pub fn upsert_latest(&mut self, record: R) -> Upsert {
        upsert_latest(&mut self.items, record)
    }

    /// Append locally-known results of a successful call.
    pub fn extend_known(&mut self, records: Vec<R>) {
        self.items = merge(&self.items, records, Direction::Newer);
    }
}
