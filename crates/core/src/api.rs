use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::FeedItem;

/// Body of a successful `GET /api/recent-actions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentActionsResponse {
    /// Feed items, most recent first.
    pub items: Vec<FeedItem>,
}

/// Query string of `GET /api/recent-actions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentActionsQuery {
    /// Serve the classifier-filtered view instead of the raw feed.
    #[serde(default)]
    pub filtered: bool,
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves requests.
    pub status: String,
    /// Time of the last successful fetch, if any happened in this process.
    pub last_update: Option<DateTime<Utc>>,
    /// Whether startup got the classifier live with its model in place.
    /// False when the checks were skipped.
    #[serde(default)]
    pub classifier_ready: bool,
}

/// Body returned with non-2xx statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable reason.
    pub detail: String,
}
