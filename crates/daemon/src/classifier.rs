//! Client for the text-classification dependency (an Ollama-compatible API).

use std::time::Duration;

use async_trait::async_trait;
use recent_actions_core::verdict::{is_affirmative, prompt_for_title};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("classifier returned status {0}")]
    Status(StatusCode),
    #[error("malformed classifier response: {0}")]
    Decode(String),
    #[error("model provisioning failed: {0}")]
    Provision(String),
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

/// Yes/no judgment service plus the lifecycle calls needed before using it.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// True when the service answers at all.
    async fn is_live(&self) -> bool;

    /// Makes sure `model` is available, waiting for any download to finish.
    async fn provision_model(&self, model: &str) -> Result<(), ClassifierError>;

    /// Whether `text` is technical.
    async fn classify(&self, text: &str) -> Result<bool, ClassifierError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    total: Option<u64>,
}

/// One decoded line of the pull progress stream.
#[derive(Debug, PartialEq, Eq)]
enum PullEvent {
    Progress(String),
    Success,
    Blank,
}

fn parse_pull_line(line: &[u8]) -> Result<PullEvent, ClassifierError> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(PullEvent::Blank);
    }
    let status: PullStatus =
        serde_json::from_slice(line).map_err(|e| ClassifierError::Decode(format!("pull progress: {e}")))?;
    if let Some(err) = status.error {
        return Err(ClassifierError::Provision(err));
    }
    match status.status.as_deref() {
        Some("success") => Ok(PullEvent::Success),
        Some(s) => {
            let progress = match (status.completed, status.total) {
                (Some(done), Some(total)) if total > 0 => format!("{s} ({}%)", done * 100 / total),
                _ => s.to_owned(),
            };
            Ok(PullEvent::Progress(progress))
        }
        None => Ok(PullEvent::Blank),
    }
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    request_timeout: Duration,
}

impl OllamaClient {
    /// `request_timeout` bounds liveness and classify calls. Model pulls are
    /// not bounded since they may download gigabytes.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            model: model.into(),
            request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Classifier for OllamaClient {
    async fn is_live(&self) -> bool {
        match self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                debug!(error = %e, "classifier liveness probe failed");
                false
            }
        }
    }

    async fn provision_model(&self, model: &str) -> Result<(), ClassifierError> {
        let mut resp = self
            .client
            .post(self.url("/api/pull"))
            .json(&PullRequest { name: model, stream: true })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ClassifierError::Status(resp.status()));
        }

        let mut pending: Vec<u8> = Vec::new();
        let mut last_status = String::new();
        while let Some(chunk) = resp.chunk().await? {
            pending.extend_from_slice(&chunk);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                match parse_pull_line(&line)? {
                    PullEvent::Success => {
                        info!(model, "model ready");
                        return Ok(());
                    }
                    PullEvent::Progress(status) => {
                        if status != last_status {
                            debug!(model, %status, "pulling model");
                            last_status = status;
                        }
                    }
                    PullEvent::Blank => {}
                }
            }
        }
        if parse_pull_line(&pending)? == PullEvent::Success {
            info!(model, "model ready");
            return Ok(());
        }
        Err(ClassifierError::Provision(format!(
            "stream for {model} ended without success (last status: {last_status:?})"
        )))
    }

    async fn classify(&self, text: &str) -> Result<bool, ClassifierError> {
        let resp = self
            .client
            .post(self.url("/api/generate"))
            .timeout(self.request_timeout)
            .json(&GenerateRequest {
                model: &self.model,
                prompt: prompt_for_title(text),
                stream: false,
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ClassifierError::Status(resp.status()));
        }
        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ClassifierError::Decode(e.to_string()))?;
        Ok(is_affirmative(&body.response))
    }
}
