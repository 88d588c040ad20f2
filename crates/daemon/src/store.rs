//! On-disk copy of the last snapshot, used to start without a fetch.
//!
//! The file has the same shape as the read endpoint's body. Files written by
//! older deployments used a `recent_actions` key and are still accepted.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use recent_actions_core::{FeedItem, Snapshot};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    #[serde(alias = "recent_actions")]
    items: Vec<FeedItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    captured_at: Option<DateTime<Utc>>,
}

/// Contents of a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub items: Vec<FeedItem>,
    /// Missing in files written by older deployments.
    pub captured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored snapshot. A missing file is `Ok(None)`.
    pub async fn load(&self) -> Result<Option<StoredSnapshot>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        let file: SnapshotFile = serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(StoredSnapshot {
            items: file.items,
            captured_at: file.captured_at,
        }))
    }

    /// Writes the snapshot, replacing the previous file atomically.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| self.io_err(e))?;
        }
        let file = SnapshotFile {
            items: snapshot.items.clone(),
            captured_at: Some(snapshot.captured_at),
        };
        let body = serde_json::to_vec_pretty(&file).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(|e| self.io_err(e))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| self.io_err(e))?;
        Ok(())
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
