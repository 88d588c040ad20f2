use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use recent_actions_core::RetryPolicy;

use crate::readiness::ReadinessSettings;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen: SocketAddr,

    pub page_url: String,
    pub fetch_timeout: Duration,
    pub refresh_interval: Duration,
    /// Where the last snapshot is kept between restarts. `None` disables it.
    pub snapshot_path: Option<PathBuf>,

    pub classifier_url: String,
    pub classifier_timeout: Duration,
    pub classify_retry: RetryPolicy,

    /// Also carries the model id used for classification.
    pub readiness: ReadinessSettings,
    pub skip_readiness: bool,
}
