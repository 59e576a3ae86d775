//! Per-context resolution state
//!
//! Holds the single "current query" of one consuming context. Every mutation
//! carries the [`QueryHandle`] issued when that query began and is dropped
//! unless the handle is still the active, uncancelled one, so a slow,
//! superseded query can never overwrite a newer result.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ResolutionError;
use crate::types::{shorten_address, RecordPatch, ResolutionRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPhase {
    #[default]
    Idle,
    Loading,
    Resolved,
    Failed,
}

/// Snapshot of the current query as seen by the rendering layer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionState {
    pub phase: ResolutionPhase,
    /// Normalized lookup key of the current query
    pub query: Option<String>,
    pub is_loading: bool,
    pub error: Option<ResolutionError>,
    pub record: ResolutionRecord,
}

impl ResolutionState {
    fn loading(query: &str) -> Self {
        Self {
            phase: ResolutionPhase::Loading,
            query: Some(query.to_string()),
            is_loading: true,
            error: None,
            record: ResolutionRecord::new(),
        }
    }

    pub fn resolved_address(&self) -> Option<&str> {
        self.record.address.as_deref()
    }

    pub fn resolved_name(&self) -> Option<&str> {
        self.record.name.as_deref()
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.record.avatar_url.as_deref()
    }

    pub fn biography(&self) -> Option<&str> {
        self.record.biography.as_deref()
    }

    pub fn social_links(&self) -> &BTreeMap<String, String> {
        &self.record.social_links
    }

    pub fn keywords(&self) -> &[String] {
        &self.record.keywords
    }

    /// Name if known, otherwise the shortened address
    pub fn display_name(&self) -> Option<String> {
        self.resolved_name()
            .map(str::to_string)
            .or_else(|| self.resolved_address().map(shorten_address))
    }
}

/// Ties a query to its cancellation token
#[derive(Debug, Clone)]
pub struct QueryHandle {
    id: u64,
    token: CancellationToken,
}

impl QueryHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once a newer query supersedes this one
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

pub struct ResolutionStateStore {
    state: watch::Sender<ResolutionState>,
    active: Mutex<Option<QueryHandle>>,
    next_id: AtomicU64,
}

impl ResolutionStateStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ResolutionState::default());
        Self {
            state,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ResolutionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ResolutionState {
        self.state.borrow().clone()
    }

    /// Cancel and forget the in-flight query, if any
    pub fn reset(&self) {
        let mut active = self.lock_active();
        Self::cancel(&mut active);
    }

    /// Supersede whatever is in flight and enter `Loading` for `query`
    pub fn begin(&self, query: &str) -> QueryHandle {
        let mut active = self.lock_active();
        Self::cancel(&mut active);

        let handle = QueryHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        *active = Some(handle.clone());
        self.state.send_replace(ResolutionState::loading(query));
        debug!(query_id = handle.id, query = %query, "Query started");
        handle
    }

    /// Shallow-merge a partial record into the current one
    pub fn update_state(&self, handle: &QueryHandle, patch: RecordPatch) -> bool {
        if patch.is_empty() {
            return false;
        }
        self.commit(handle, |state| state.record.apply(patch))
    }

    pub fn resolve(&self, handle: &QueryHandle, record: ResolutionRecord) -> bool {
        self.commit(handle, |state| {
            state.phase = ResolutionPhase::Resolved;
            state.is_loading = false;
            state.error = None;
            state.record = record;
        })
    }

    /// Terminal failure; `fallback` keeps whatever identifier is already known
    pub fn fail(
        &self,
        handle: &QueryHandle,
        error: ResolutionError,
        fallback: ResolutionRecord,
    ) -> bool {
        self.commit(handle, |state| {
            state.phase = ResolutionPhase::Failed;
            state.is_loading = false;
            state.error = Some(error);
            state.record.merge(&fallback);
        })
    }

    /// The consuming view went away: stop in-flight work and go idle
    pub fn teardown(&self) {
        let mut active = self.lock_active();
        Self::cancel(&mut active);
        self.state.send_replace(ResolutionState::default());
    }

    fn commit(&self, handle: &QueryHandle, update: impl FnOnce(&mut ResolutionState)) -> bool {
        let active = self.lock_active();
        let current = active
            .as_ref()
            .is_some_and(|a| a.id == handle.id && !handle.is_cancelled());
        if !current {
            debug!(query_id = handle.id, "Discarding update from superseded query");
            return false;
        }
        self.state.send_modify(update);
        true
    }

    fn cancel(active: &mut Option<QueryHandle>) {
        if let Some(previous) = active.take() {
            previous.token.cancel();
            debug!(query_id = previous.id, "Query cancelled");
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<QueryHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ResolutionStateStore {
    fn default() -> Self {
        Self::new()
    }
}
