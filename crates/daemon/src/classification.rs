//! Background derivation of the technical-only view.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use recent_actions_core::{RetryPolicy, Snapshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::FeedCache;
use crate::classifier::Classifier;
use crate::retry::retry;

/// What a caller asking for the filtered view gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivedView {
    /// The filtered view of the current snapshot.
    Ready(Arc<Snapshot>),
    /// There is no primary snapshot to filter yet.
    NoPrimary,
    /// This call started a classification run.
    Started,
    /// A run started by an earlier call has not finished.
    InProgress,
}

/// Returned by [`ClassificationPipeline::run_classification`] when another run
/// holds the in-progress flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a classification run is already in progress")]
pub struct AlreadyRunning;

/// Clears the in-progress flag when dropped, whichever way the run ends.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ClassificationPipeline {
    classifier: Arc<dyn Classifier>,
    cache: Arc<FeedCache>,
    policy: RetryPolicy,
    in_progress: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClassificationPipeline {
    pub fn new(classifier: Arc<dyn Classifier>, cache: Arc<FeedCache>, policy: RetryPolicy) -> Self {
        Self {
            classifier,
            cache,
            policy,
            in_progress: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Classifies one text, retrying per the policy. A text the classifier
    /// never answers for counts as non-technical.
    pub async fn classify_item(&self, text: &str) -> bool {
        match retry(&self.policy, || self.classifier.classify(text)).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(
                    attempts = self.policy.max_attempts,
                    error = %e,
                    title = text,
                    "classifier gave up; treating item as non-technical"
                );
                false
            }
        }
    }

    /// Runs classification over `snapshot` in the calling task and installs
    /// the result. Fails fast if another run is active.
    ///
    /// Returns the filtered snapshot even when it was not installed because
    /// the primary snapshot moved on while the run was going.
    pub async fn run_classification(&self, snapshot: Arc<Snapshot>) -> Result<Arc<Snapshot>, AlreadyRunning> {
        let _guard = self.begin().ok_or(AlreadyRunning)?;
        Ok(self.classify_and_install(&snapshot).await)
    }

    /// Serves the filtered view or kicks off a background run to build it.
    /// Never waits for classification.
    pub fn derived_view(self: &Arc<Self>) -> DerivedView {
        if let Some(derived) = self.cache.derived() {
            return DerivedView::Ready(derived);
        }
        let Some(primary) = self.cache.primary() else {
            return DerivedView::NoPrimary;
        };
        self.spawn_run(primary)
    }

    /// Starts a background run over `snapshot` unless one is active or the
    /// filtered view appeared since the caller last looked.
    pub fn spawn_run(self: &Arc<Self>, snapshot: Arc<Snapshot>) -> DerivedView {
        // Held across flag + spawn + store so a finishing run's caller can't
        // overwrite the handle of the run that replaced it.
        let mut task = self.task_slot();
        let Some(guard) = self.begin() else {
            return DerivedView::InProgress;
        };
        // A run may have installed its result between the caller's check and
        // the flag swap.
        if let Some(derived) = self.cache.derived() {
            drop(guard);
            return DerivedView::Ready(derived);
        }
        let this = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            let _guard = guard;
            this.classify_and_install(&snapshot).await;
        }));
        DerivedView::Started
    }

    /// Waits for the background run, if any, to finish.
    pub async fn join(&self) {
        let handle = self.task_slot().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "classification task panicked");
                }
            }
        }
    }

    /// Abandons the background run, if any.
    pub fn abort(&self) {
        if let Some(handle) = self.task_slot().take() {
            handle.abort();
        }
    }

    fn begin(&self) -> Option<RunGuard> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(Arc::clone(&self.in_progress)))
    }

    async fn classify_and_install(&self, snapshot: &Snapshot) -> Arc<Snapshot> {
        info!(generation = snapshot.generation, items = snapshot.len(), "classification started");

        let mut kept = Vec::new();
        for item in &snapshot.items {
            if self.classify_item(&item.blog_title).await {
                kept.push(item.clone());
            }
        }
        let derived = snapshot.derive(kept);
        let kept_count = derived.len();

        if self.cache.install_derived(derived.clone()) {
            info!(generation = snapshot.generation, kept = kept_count, "classification finished");
        } else {
            info!(
                generation = snapshot.generation,
                "classification finished for a replaced snapshot; result discarded"
            );
        }
        Arc::new(derived)
    }

    fn task_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
