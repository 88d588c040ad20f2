#![forbid(unsafe_code)]

//! Recent-actions daemon entrypoint.

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use recent_actions_core::RetryPolicy;
use recent_actions_daemon::{
    classifier::OllamaClient,
    clock::SystemClock,
    config::DaemonConfig,
    fetcher::HtmlFetcher,
    http,
    readiness::ReadinessSettings,
    store::SnapshotStore,
    FeedService,
};
use tokio::{signal, sync::watch};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "recent-actions-daemon", version, about = "Cached recent-actions feed with a classifier-filtered view")]
struct Args {
    /// Listen address, e.g. 127.0.0.1:8000
    #[arg(long, env = "RECENT_ACTIONS_LISTEN", default_value = "127.0.0.1:8000")]
    listen: SocketAddr,

    /// Page whose recent-actions list is cached.
    #[arg(long, env = "RECENT_ACTIONS_PAGE_URL", default_value = "https://codeforces.com/")]
    page_url: String,

    /// Timeout for one page download, in seconds.
    #[arg(long, env = "RECENT_ACTIONS_FETCH_TIMEOUT_SECONDS", default_value_t = 30)]
    fetch_timeout_seconds: u64,

    /// Refresh interval in seconds.
    #[arg(long, env = "RECENT_ACTIONS_REFRESH_SECONDS", default_value_t = 1800)]
    refresh_seconds: u64,

    /// File the last snapshot is saved to and bootstrapped from.
    #[arg(long, env = "RECENT_ACTIONS_SNAPSHOT_PATH", default_value = "output/scrape_recent_actions.json")]
    snapshot_path: PathBuf,

    /// Neither load nor save a snapshot file.
    #[arg(long, env = "RECENT_ACTIONS_NO_SNAPSHOT", default_value_t = false)]
    no_snapshot: bool,

    /// Base URL of the classifier (Ollama API).
    #[arg(long, env = "RECENT_ACTIONS_CLASSIFIER_URL", default_value = "http://127.0.0.1:11434")]
    classifier_url: String,

    /// Model used for classification; pulled at startup.
    #[arg(long, env = "RECENT_ACTIONS_MODEL", default_value = "llama3.2")]
    model: String,

    /// Timeout for one classify or liveness call, in seconds.
    #[arg(long, env = "RECENT_ACTIONS_CLASSIFIER_TIMEOUT_SECONDS", default_value_t = 60)]
    classifier_timeout_seconds: u64,

    /// Attempts per item before it is treated as non-technical.
    #[arg(long, env = "RECENT_ACTIONS_CLASSIFY_ATTEMPTS", default_value_t = 3)]
    classify_attempts: u32,

    /// Delay between classify attempts, in milliseconds.
    #[arg(long, env = "RECENT_ACTIONS_CLASSIFY_RETRY_MS", default_value_t = 1_000)]
    classify_retry_ms: u64,

    /// Liveness probes before startup gives up.
    #[arg(long, env = "RECENT_ACTIONS_READINESS_ATTEMPTS", default_value_t = 30)]
    readiness_attempts: u32,

    /// Seconds between liveness probes.
    #[arg(long, env = "RECENT_ACTIONS_READINESS_INTERVAL_SECONDS", default_value_t = 10)]
    readiness_interval_seconds: u64,

    /// Start serving without waiting for the classifier.
    #[arg(long, env = "RECENT_ACTIONS_SKIP_READINESS", default_value_t = false)]
    skip_readiness: bool,

    /// Log level (env-filter syntax).
    #[arg(long, env = "RECENT_ACTIONS_LOG", default_value = "info")]
    log: String,
}

impl Args {
    fn into_config(self) -> DaemonConfig {
        DaemonConfig {
            listen: self.listen,
            page_url: self.page_url,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_seconds),
            refresh_interval: Duration::from_secs(self.refresh_seconds),
            snapshot_path: (!self.no_snapshot).then_some(self.snapshot_path),
            classifier_url: self.classifier_url,
            classifier_timeout: Duration::from_secs(self.classifier_timeout_seconds),
            classify_retry: RetryPolicy::fixed(self.classify_attempts, Duration::from_millis(self.classify_retry_ms)),
            readiness: ReadinessSettings {
                max_attempts: self.readiness_attempts,
                interval: Duration::from_secs(self.readiness_interval_seconds),
                model: self.model,
            },
            skip_readiness: self.skip_readiness,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.into_config();
    info!(?config, "starting daemon");

    let classifier = Arc::new(
        OllamaClient::new(&config.classifier_url, &config.readiness.model, config.classifier_timeout)
            .context("building classifier client")?,
    );

    let fetcher = Arc::new(HtmlFetcher::new(&config.page_url, config.fetch_timeout).context("building fetcher")?);
    let store = config.snapshot_path.clone().map(SnapshotStore::new);
    let svc = Arc::new(FeedService::new(
        fetcher,
        classifier.clone(),
        Arc::new(SystemClock),
        store,
        config.classify_retry,
    ));

    if config.skip_readiness {
        warn!("skipping classifier readiness checks");
    } else {
        svc.readiness()
            .open(classifier.as_ref(), &config.readiness)
            .await
            .context("classifier dependency is not ready")?;
    }

    if !svc.refresher().bootstrap().await {
        warn!("no initial snapshot; serving 503 until the next successful refresh");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_task = Arc::clone(svc.refresher()).spawn_periodic(config.refresh_interval, shutdown_rx);

    let app = http::router(Arc::clone(&svc));

    info!(listen = %config.listen, "listening");
    axum::serve(tokio::net::TcpListener::bind(config.listen).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = refresh_task.await {
        if !e.is_cancelled() {
            warn!(error = %e, "refresh task ended abnormally");
        }
    }
    svc.classification().abort();
    info!("daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
