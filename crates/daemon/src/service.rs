use std::sync::Arc;

use recent_actions_core::api::HealthResponse;
use recent_actions_core::{RetryPolicy, Snapshot};
use thiserror::Error;

use crate::cache::FeedCache;
use crate::classification::{ClassificationPipeline, DerivedView};
use crate::classifier::Classifier;
use crate::clock::Clock;
use crate::fetcher::Fetcher;
use crate::readiness::{Readiness, ReadinessGate};
use crate::refresh::RefreshCoordinator;
use crate::store::SnapshotStore;

/// Expected "come back later" states of the read endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Unavailable {
    #[error("Data not yet available")]
    NoData,
    #[error("Filtering started; filtered data will be available shortly")]
    FilteringStarted,
    #[error("Filtering already in progress; try again shortly")]
    FilteringInProgress,
}

/// Owns the cache and its two writers and answers read requests.
pub struct FeedService {
    cache: Arc<FeedCache>,
    refresher: Arc<RefreshCoordinator>,
    classification: Arc<ClassificationPipeline>,
    readiness: ReadinessGate,
}

impl FeedService {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        classifier: Arc<dyn Classifier>,
        clock: Arc<dyn Clock>,
        store: Option<SnapshotStore>,
        retry: RetryPolicy,
    ) -> Self {
        let cache = Arc::new(FeedCache::new());
        let refresher = Arc::new(RefreshCoordinator::new(fetcher, Arc::clone(&cache), clock, store));
        let classification = Arc::new(ClassificationPipeline::new(classifier, Arc::clone(&cache), retry));
        Self {
            cache,
            refresher,
            classification,
            readiness: ReadinessGate::new(),
        }
    }

    pub fn cache(&self) -> &Arc<FeedCache> {
        &self.cache
    }

    pub fn refresher(&self) -> &Arc<RefreshCoordinator> {
        &self.refresher
    }

    pub fn classification(&self) -> &Arc<ClassificationPipeline> {
        &self.classification
    }

    /// Settled once at startup, before the first request is served.
    pub fn readiness(&self) -> &ReadinessGate {
        &self.readiness
    }

    /// Current feed, or the filtered view when `filtered` is set. May start a
    /// background classification run; never waits for one.
    pub fn recent_actions(&self, filtered: bool) -> Result<Arc<Snapshot>, Unavailable> {
        if !filtered {
            return self.cache.primary().ok_or(Unavailable::NoData);
        }
        match self.classification.derived_view() {
            DerivedView::Ready(snapshot) => Ok(snapshot),
            DerivedView::NoPrimary => Err(Unavailable::NoData),
            DerivedView::Started => Err(Unavailable::FilteringStarted),
            DerivedView::InProgress => Err(Unavailable::FilteringInProgress),
        }
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy".to_string(),
            last_update: self.cache.last_update(),
            classifier_ready: self.readiness.state() == Readiness::Ready,
        }
    }
}
