//! Pipeline wiring, configuration and counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nestlink_core::config::events as defaults;
use nestlink_oauth::TokenProvider;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::callback::CallbackSender;
use crate::feed::EventFeed;
use crate::publisher::Publisher;
use crate::puller::Puller;

/// Event pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Device Access project the events belong to
    pub project_id: String,
    /// Messages published longer ago than this many seconds are acknowledged and dropped
    #[serde(default = "default_max_age")]
    pub max_message_age: u64,
    /// Messages requested per pull
    #[serde(default = "default_pull_batch")]
    pub pull_batch: usize,
    /// Seconds to wait after a failed pull
    #[serde(default = "default_pull_backoff")]
    pub pull_backoff: u64,
    /// Concurrent publisher workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Log every received message body at debug level
    #[serde(default)]
    pub log_messages: bool,
}

fn default_max_age() -> u64 {
    defaults::DEFAULT_MAX_AGE_SECS
}

fn default_pull_batch() -> usize {
    defaults::DEFAULT_PULL_BATCH
}

fn default_pull_backoff() -> u64 {
    defaults::DEFAULT_PULL_BACKOFF_SECS
}

fn default_workers() -> usize {
    defaults::DEFAULT_WORKERS
}

impl PipelineConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            max_message_age: default_max_age(),
            pull_batch: default_pull_batch(),
            pull_backoff: default_pull_backoff(),
            workers: default_workers(),
            log_messages: false,
        }
    }
}

/// Running message counters.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub(crate) pulled: AtomicU64,
    pub(crate) stale: AtomicU64,
    pub(crate) malformed: AtomicU64,
    pub(crate) ignored: AtomicU64,
    pub(crate) dispatched: AtomicU64,
    pub(crate) forwarded: AtomicU64,
    pub(crate) failed: AtomicU64,
}

impl PipelineStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pulled: self.pulled.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub pulled: u64,
    pub stale: u64,
    pub malformed: u64,
    /// Decoded messages that were not resource updates.
    pub ignored: u64,
    pub dispatched: u64,
    /// Callbacks delivered and acknowledged.
    pub forwarded: u64,
    pub failed: u64,
}

/// One puller and its publisher pool, joined by a single-slot handoff.
pub struct Pipeline {
    feed: Arc<dyn EventFeed>,
    tokens: Arc<dyn TokenProvider>,
    sender: Arc<dyn CallbackSender>,
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
    span: Span,
}

impl Pipeline {
    pub fn new(
        feed: Arc<dyn EventFeed>,
        tokens: Arc<dyn TokenProvider>,
        sender: Arc<dyn CallbackSender>,
        config: PipelineConfig,
        span: Span,
    ) -> Self {
        Self {
            feed,
            tokens,
            sender,
            config,
            stats: Arc::new(PipelineStats::default()),
            span,
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Run until `cancel` fires and every in-flight worker has finished.
    pub async fn run(self, cancel: CancellationToken) -> StatsSnapshot {
        let Pipeline {
            feed,
            tokens,
            sender,
            config,
            stats,
            span,
        } = self;

        tracing::info!(
            parent: &span,
            project_id = %config.project_id,
            workers = config.workers,
            max_message_age = config.max_message_age,
            "Starting event pipeline"
        );

        let (handoff_tx, handoff_rx) = mpsc::channel(1);

        let publisher = Publisher::new(
            feed.clone(),
            tokens,
            sender,
            &config,
            stats.clone(),
            span.clone(),
        );
        let puller = Puller::new(feed, &config, stats.clone(), span.clone());

        let publishing = tokio::spawn(publisher.run(handoff_rx));
        puller.run(handoff_tx, cancel).await;

        if let Err(e) = publishing.await {
            tracing::error!(parent: &span, error = %e, "Publisher task failed");
        }

        let snapshot = stats.snapshot();
        tracing::info!(parent: &span, stats = ?snapshot, "Event pipeline done");
        snapshot
    }
}
