//! Single-flight refresh of the primary snapshot and the periodic loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::cache::FeedCache;
use crate::clock::Clock;
use crate::fetcher::Fetcher;
use crate::store::SnapshotStore;

pub struct RefreshCoordinator {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<FeedCache>,
    clock: Arc<dyn Clock>,
    store: Option<SnapshotStore>,
    update_lock: Mutex<()>,
}

impl RefreshCoordinator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        cache: Arc<FeedCache>,
        clock: Arc<dyn Clock>,
        store: Option<SnapshotStore>,
    ) -> Self {
        Self {
            fetcher,
            cache,
            clock,
            store,
            update_lock: Mutex::new(()),
        }
    }

    /// Fetches once and installs the result.
    ///
    /// Callers are serialized: a second call waits for the first to finish
    /// and then fetches on its own. On failure the previous snapshot stays in
    /// place and `false` is returned.
    pub async fn refresh(&self) -> bool {
        let _guard = self.update_lock.lock().await;

        let items = match self.fetcher.fetch().await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "feed refresh failed; keeping previous snapshot");
                return false;
            }
        };

        let snapshot = self.cache.install_fetched(items, self.clock.now());
        info!(generation = snapshot.generation, items = snapshot.len(), "feed refreshed");

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&snapshot).await {
                warn!(error = %e, "could not persist snapshot");
            }
        }
        true
    }

    /// Seeds the cache before serving: from the snapshot file when there is
    /// one, otherwise with a fetch. Returns whether a snapshot is now present.
    pub async fn bootstrap(&self) -> bool {
        if let Some(store) = &self.store {
            match store.load().await {
                Ok(Some(stored)) => {
                    let captured_at = stored.captured_at.unwrap_or_else(|| self.clock.now());
                    let snapshot = self.cache.install_loaded(stored.items, captured_at);
                    info!(
                        path = %store.path().display(),
                        items = snapshot.len(),
                        "loaded snapshot from disk"
                    );
                    return true;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "ignoring unreadable snapshot file"),
            }
        }
        self.refresh().await
    }

    /// Spawns the periodic refresh loop.
    ///
    /// The first refresh happens one `period` after the call. The loop ends
    /// when `shutdown` flips to `true` or its sender is dropped; a pending
    /// sleep is abandoned, an in-flight refresh is allowed to finish.
    pub fn spawn_periodic(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                if *shutdown.borrow_and_update() {
                    break;
                }
                tokio::select! {
                    _ = tick.tick() => {
                        self.refresh().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            info!("periodic refresh stopped");
        })
    }
}
