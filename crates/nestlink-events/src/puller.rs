//! Pull loop.
//!
//! Pulls batches from the feed, acknowledges stale messages, drops the
//! undecodable ones and hands events to the publisher one at a time. The
//! handoff blocks until the publisher has a free worker, which bounds how far
//! pulling runs ahead of delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::envelope::{Disposition, EnvelopeDecoder, SdmEvent};
use crate::feed::EventFeed;
use crate::pipeline::{PipelineConfig, PipelineStats};

pub struct Puller {
    feed: Arc<dyn EventFeed>,
    decoder: EnvelopeDecoder,
    batch: usize,
    backoff: Duration,
    log_messages: bool,
    stats: Arc<PipelineStats>,
    span: Span,
}

impl Puller {
    pub fn new(
        feed: Arc<dyn EventFeed>,
        config: &PipelineConfig,
        stats: Arc<PipelineStats>,
        span: Span,
    ) -> Self {
        Self {
            feed,
            decoder: EnvelopeDecoder::new(
                &config.project_id,
                Duration::from_secs(config.max_message_age),
            ),
            batch: config.pull_batch.max(1),
            backoff: Duration::from_secs(config.pull_backoff),
            log_messages: config.log_messages,
            stats,
            span,
        }
    }

    /// Pull until `cancel` fires. Dropping `handoff` on return closes the
    /// publisher's side.
    pub async fn run(self, handoff: mpsc::Sender<SdmEvent>, cancel: CancellationToken) {
        tracing::info!(parent: &self.span, batch = self.batch, "Pull loop started");

        loop {
            let pulled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.feed.pull(self.batch) => result,
            };

            let messages = match pulled {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::error!(
                        parent: &self.span,
                        error = %e,
                        backoff_secs = self.backoff.as_secs(),
                        "Pull failed"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.backoff) => continue,
                    }
                }
            };

            self.stats
                .pulled
                .fetch_add(messages.len() as u64, std::sync::atomic::Ordering::Relaxed);

            let now = Utc::now();
            let mut stale = Vec::new();
            let mut stopping = false;

            for message in messages {
                if self.log_messages {
                    tracing::debug!(
                        parent: &self.span,
                        message_id = %message.message_id,
                        publish_time = %message.publish_time,
                        data = %message.data,
                        "Received message"
                    );
                }

                match self.decoder.classify(&message, now) {
                    Disposition::Stale => {
                        PipelineStats::incr(&self.stats.stale);
                        tracing::debug!(
                            parent: &self.span,
                            message_id = %message.message_id,
                            publish_time = %message.publish_time,
                            "Dropping stale message"
                        );
                        stale.push(message.ack_id);
                    }
                    Disposition::Malformed(reason) => {
                        PipelineStats::incr(&self.stats.malformed);
                        tracing::warn!(
                            parent: &self.span,
                            message_id = %message.message_id,
                            reason = %reason,
                            "Dropping malformed message"
                        );
                    }
                    Disposition::NotResourceUpdate => {
                        PipelineStats::incr(&self.stats.ignored);
                        tracing::warn!(
                            parent: &self.span,
                            message_id = %message.message_id,
                            "Dropping message without resource update"
                        );
                    }
                    Disposition::Event(event) => {
                        let device_id = event.device_id.clone();
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                tracing::info!(
                                    parent: &self.span,
                                    device_id = %device_id,
                                    "Shutting down, abandoning handoff"
                                );
                                stopping = true;
                            }
                            sent = handoff.send(event) => match sent {
                                Ok(()) => PipelineStats::incr(&self.stats.dispatched),
                                Err(_) => {
                                    tracing::error!(parent: &self.span, "Publisher stopped, ending pull loop");
                                    stopping = true;
                                }
                            },
                        }
                        if stopping {
                            break;
                        }
                    }
                }
            }

            self.acknowledge_stale(&stale).await;

            if stopping {
                break;
            }
        }

        tracing::info!(parent: &self.span, "Pull loop stopped");
    }

    async fn acknowledge_stale(&self, ack_ids: &[String]) {
        if ack_ids.is_empty() {
            return;
        }
        if let Err(e) = self.feed.acknowledge(ack_ids).await {
            tracing::warn!(
                parent: &self.span,
                error = %e,
                count = ack_ids.len(),
                "Failed to acknowledge stale messages"
            );
        }
    }
}
