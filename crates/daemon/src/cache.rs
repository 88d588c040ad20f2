//! Primary and derived snapshot state.
//!
//! Readers clone an `Arc` under a short read lock and never wait on network
//! calls. Writers are the refresh coordinator (primary) and the
//! classification pipeline (derived).

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use recent_actions_core::{FeedItem, Snapshot};

#[derive(Default)]
struct CacheState {
    primary: Option<Arc<Snapshot>>,
    last_update: Option<DateTime<Utc>>,
    derived: Option<Arc<Snapshot>>,
    generation: u64,
}

/// Shared cache of the latest feed snapshot and its filtered view.
#[derive(Default)]
pub struct FeedCache {
    state: RwLock<CacheState>,
}

impl FeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest primary snapshot, if any was installed.
    pub fn primary(&self) -> Option<Arc<Snapshot>> {
        self.read().primary.clone()
    }

    /// Time of the last successful fetch.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.read().last_update
    }

    /// Filtered view, only if it was computed from the current primary snapshot.
    pub fn derived(&self) -> Option<Arc<Snapshot>> {
        let state = self.read();
        match (&state.primary, &state.derived) {
            (Some(p), Some(d)) if p.generation == d.generation => Some(Arc::clone(d)),
            _ => None,
        }
    }

    /// Installs freshly fetched items as the new primary snapshot.
    ///
    /// Bumps the generation, records `fetched_at` as the last update and
    /// drops the derived view, all under one write lock.
    pub fn install_fetched(&self, items: Vec<FeedItem>, fetched_at: DateTime<Utc>) -> Arc<Snapshot> {
        self.install(items, fetched_at, Some(fetched_at))
    }

    /// Installs a snapshot loaded from disk. The last-update time is left alone
    /// since nothing was fetched.
    pub fn install_loaded(&self, items: Vec<FeedItem>, captured_at: DateTime<Utc>) -> Arc<Snapshot> {
        self.install(items, captured_at, None)
    }

    fn install(
        &self,
        items: Vec<FeedItem>,
        captured_at: DateTime<Utc>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Arc<Snapshot> {
        let mut state = self.write();
        state.generation += 1;
        let snapshot = Arc::new(Snapshot::new(state.generation, captured_at, items));
        state.primary = Some(Arc::clone(&snapshot));
        state.derived = None;
        if updated_at.is_some() {
            state.last_update = updated_at;
        }
        snapshot
    }

    /// Stores a filtered view. Returns `false` and discards it when the
    /// primary snapshot changed since the view's source was read.
    pub fn install_derived(&self, derived: Snapshot) -> bool {
        let mut state = self.write();
        let current = state.primary.as_ref().map(|p| p.generation);
        if current != Some(derived.generation) {
            return false;
        }
        state.derived = Some(Arc::new(derived));
        true
    }

    // The state is only ever replaced field by field, so a panic while a guard
    // was held cannot leave it half-written.
    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
