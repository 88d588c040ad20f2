//! Stub collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use recent_actions_core::{FeedItem, RetryPolicy};
use recent_actions_daemon::classifier::{Classifier, ClassifierError};
use recent_actions_daemon::clock::Clock;
use recent_actions_daemon::fetcher::{FetchError, Fetcher};
use recent_actions_daemon::store::SnapshotStore;
use recent_actions_daemon::FeedService;
use tokio::sync::watch;

pub fn item(user: &str, title: &str) -> FeedItem {
    FeedItem {
        user: user.to_string(),
        user_profile: format!("/profile/{user}"),
        user_color: Some("blue".to_string()),
        blog_title: title.to_string(),
        blog_link: format!("/blog/entry/{}", title.len()),
        img: None,
        other_img: vec![],
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
}

/// Fetcher that replays scripted results and tracks overlap.
#[derive(Default)]
pub struct StubFetcher {
    script: Mutex<VecDeque<Result<Vec<FeedItem>, String>>>,
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each fetch sleeps this long before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn push_ok(&self, items: Vec<FeedItem>) {
        self.script.lock().unwrap().push_back(Ok(items));
    }

    pub fn push_err(&self, msg: &str) {
        self.script.lock().unwrap().push_back(Err(msg.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    /// An exhausted script answers with an empty feed.
    async fn fetch(&self) -> Result<Vec<FeedItem>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();

        self.active.fetch_sub(1, Ordering::SeqCst);
        match next {
            Some(Ok(items)) => Ok(items),
            Some(Err(msg)) => Err(FetchError::Parse(msg)),
            None => Ok(vec![]),
        }
    }
}

type Verdict = dyn Fn(&str) -> Option<bool> + Send + Sync;

/// Classifier driven by a closure. `None` from the closure is a failed call.
pub struct StubClassifier {
    verdict: Box<Verdict>,
    gate: Option<watch::Receiver<bool>>,
    calls: Mutex<Vec<String>>,
    failed_probes: usize,
    probes: AtomicUsize,
    provision_error: Option<String>,
    provisioned: Mutex<Vec<String>>,
}

impl StubClassifier {
    pub fn new(verdict: impl Fn(&str) -> Option<bool> + Send + Sync + 'static) -> Self {
        Self {
            verdict: Box::new(verdict),
            gate: None,
            calls: Mutex::new(Vec::new()),
            failed_probes: 0,
            probes: AtomicUsize::new(0),
            provision_error: None,
            provisioned: Mutex::new(Vec::new()),
        }
    }

    /// Titles mentioning "tree" are technical.
    pub fn trees() -> Self {
        Self::new(|t| Some(t.contains("tree")))
    }

    /// Every classify call fails.
    pub fn unreachable() -> Self {
        Self::new(|_| None)
    }

    /// Classify calls block until the returned sender publishes `true`.
    pub fn gated(mut self) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        self.gate = Some(rx);
        (self, tx)
    }

    /// The first `n` liveness probes fail.
    pub fn live_after(mut self, n: usize) -> Self {
        self.failed_probes = n;
        self
    }

    pub fn provision_fails(mut self, msg: &str) -> Self {
        self.provision_error = Some(msg.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, text: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.as_str() == text).count()
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn provisioned(&self) -> Vec<String> {
        self.provisioned.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn is_live(&self) -> bool {
        let n = self.probes.fetch_add(1, Ordering::SeqCst);
        n >= self.failed_probes
    }

    async fn provision_model(&self, model: &str) -> Result<(), ClassifierError> {
        self.provisioned.lock().unwrap().push(model.to_string());
        match &self.provision_error {
            Some(msg) => Err(ClassifierError::Provision(msg.clone())),
            None => Ok(()),
        }
    }

    async fn classify(&self, text: &str) -> Result<bool, ClassifierError> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(gate) = &self.gate {
            let mut rx = gate.clone();
            loop {
                let open = *rx.borrow_and_update();
                if open || rx.changed().await.is_err() {
                    break;
                }
            }
        }
        (self.verdict)(text).ok_or_else(|| ClassifierError::Unavailable(format!("no verdict for {text:?}")))
    }
}

/// Clock that only moves when told to.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(Mutex::new(at))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

pub fn retry_policy() -> RetryPolicy {
    RetryPolicy::fixed(3, Duration::from_secs(1))
}

pub struct Harness {
    pub svc: Arc<FeedService>,
    pub fetcher: Arc<StubFetcher>,
    pub classifier: Arc<StubClassifier>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(fetcher: StubFetcher, classifier: StubClassifier) -> Harness {
    harness_with_store(fetcher, classifier, None)
}

pub fn harness_with_store(fetcher: StubFetcher, classifier: StubClassifier, store: Option<SnapshotStore>) -> Harness {
    let fetcher = Arc::new(fetcher);
    let classifier = Arc::new(classifier);
    let clock = Arc::new(ManualClock::new(t0()));
    let svc = Arc::new(FeedService::new(
        fetcher.clone(),
        classifier.clone(),
        clock.clone(),
        store,
        retry_policy(),
    ));
    Harness {
        svc,
        fetcher,
        classifier,
        clock,
    }
}
