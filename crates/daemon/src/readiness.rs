//! Startup barrier on the classifier dependency.

use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::classifier::{Classifier, ClassifierError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotReady,
    Ready,
    Failed,
}

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("classifier not reachable after {attempts} attempts")]
    Unreachable { attempts: u32 },
    #[error(transparent)]
    Provision(#[from] ClassifierError),
}

#[derive(Debug, Clone)]
pub struct ReadinessSettings {
    pub max_attempts: u32,
    pub interval: Duration,
    pub model: String,
}

impl Default for ReadinessSettings {
    /// 30 probes, 10 seconds apart.
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(10),
            model: "llama3.2".to_string(),
        }
    }
}

/// Polls the liveness check until it passes. Returns [`Readiness::Ready`] on
/// the first success and [`Readiness::Failed`] once `max_attempts` probes
/// have failed.
pub async fn await_dependency_ready(classifier: &dyn Classifier, max_attempts: u32, interval: Duration) -> Readiness {
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        if classifier.is_live().await {
            info!(attempt, "classifier is reachable");
            return Readiness::Ready;
        }
        if attempt < max_attempts {
            info!(attempt, max_attempts, "classifier not reachable yet; waiting");
            tokio::time::sleep(interval).await;
        }
    }
    warn!(max_attempts, "classifier never became reachable");
    Readiness::Failed
}

/// Asks the classifier to provision `model` and waits for the outcome.
pub async fn ensure_model_provisioned(classifier: &dyn Classifier, model: &str) -> Result<(), ClassifierError> {
    info!(model, "provisioning classifier model");
    classifier.provision_model(model).await
}

/// Process-wide record of whether startup got past the classifier checks.
/// Settles once and never goes back to [`Readiness::NotReady`].
#[derive(Debug, Default)]
pub struct ReadinessGate {
    state: OnceLock<Readiness>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Readiness {
        self.state.get().copied().unwrap_or(Readiness::NotReady)
    }

    /// Runs the liveness wait and model provisioning, then settles the gate.
    /// An already settled gate returns its outcome without probing again.
    pub async fn open(&self, classifier: &dyn Classifier, settings: &ReadinessSettings) -> Result<(), ReadinessError> {
        match self.state() {
            Readiness::Ready => return Ok(()),
            Readiness::Failed => {
                return Err(ReadinessError::Unreachable {
                    attempts: settings.max_attempts,
                })
            }
            Readiness::NotReady => {}
        }

        let outcome = match await_dependency_ready(classifier, settings.max_attempts, settings.interval).await {
            Readiness::Ready => ensure_model_provisioned(classifier, &settings.model)
                .await
                .map_err(ReadinessError::from),
            _ => Err(ReadinessError::Unreachable {
                attempts: settings.max_attempts,
            }),
        };

        let settled = if outcome.is_ok() { Readiness::Ready } else { Readiness::Failed };
        // A concurrent opener may have won; its outcome stands.
        let _ = self.state.set(settled);
        outcome
    }
}
