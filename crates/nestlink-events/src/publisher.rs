//! Publisher worker pool.
//!
//! A semaphore bounds the number of workers. A permit is taken before the
//! next event is received, so the handoff channel is only drained while a
//! worker is free. Each worker translates its event, posts the state
//! callback and acknowledges the message only if the callback succeeded.

use std::sync::Arc;

use nestlink_core::{DeviceState, StateCallback};
use nestlink_devices::event_states;
use nestlink_oauth::TokenProvider;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{Instrument, Span};

use crate::callback::CallbackSender;
use crate::envelope::SdmEvent;
use crate::feed::EventFeed;
use crate::pipeline::{PipelineConfig, PipelineStats};

pub struct Publisher {
    worker: Worker,
    workers: usize,
    span: Span,
}

#[derive(Clone)]
struct Worker {
    feed: Arc<dyn EventFeed>,
    tokens: Arc<dyn TokenProvider>,
    sender: Arc<dyn CallbackSender>,
    stats: Arc<PipelineStats>,
}

impl Publisher {
    pub fn new(
        feed: Arc<dyn EventFeed>,
        tokens: Arc<dyn TokenProvider>,
        sender: Arc<dyn CallbackSender>,
        config: &PipelineConfig,
        stats: Arc<PipelineStats>,
        span: Span,
    ) -> Self {
        Self {
            worker: Worker {
                feed,
                tokens,
                sender,
                stats,
            },
            workers: config.workers.max(1),
            span,
        }
    }

    /// Publish events until the handoff closes, then wait for the workers
    /// still running.
    pub async fn run(self, mut handoff: mpsc::Receiver<SdmEvent>) {
        tracing::info!(parent: &self.span, workers = self.workers, "Publish loop started");

        let limiter = Arc::new(Semaphore::new(self.workers));
        let mut in_flight = JoinSet::new();

        loop {
            let permit = match limiter.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!(parent: &self.span, "Worker semaphore closed");
                    break;
                }
            };
            let Some(event) = handoff.recv().await else {
                break;
            };

            let worker = self.worker.clone();
            let span = tracing::info_span!(
                parent: &self.span,
                "publish",
                device_id = %event.device_id,
                event_id = %event.event_id
            );
            in_flight.spawn(
                async move {
                    let _permit = permit;
                    worker.publish(event).await;
                }
                .instrument(span),
            );

            while let Some(done) = in_flight.try_join_next() {
                self.reap(done);
            }
        }

        tracing::info!(
            parent: &self.span,
            in_flight = in_flight.len(),
            "Handoff closed, waiting for workers"
        );
        while let Some(done) = in_flight.join_next().await {
            self.reap(done);
        }
        tracing::info!(parent: &self.span, "Publish loop done");
    }

    fn reap(&self, done: Result<(), tokio::task::JoinError>) {
        if let Err(e) = done {
            tracing::error!(parent: &self.span, error = %e, "Publisher worker panicked");
        }
    }
}

impl Worker {
    async fn publish(&self, event: SdmEvent) {
        let states = event_states(&event.traits, event.timestamp.timestamp_millis());

        let credentials = match self.tokens.callback_credentials().await {
            Ok(credentials) => credentials,
            Err(e) => {
                PipelineStats::incr(&self.stats.failed);
                tracing::error!(error = %e, "No callback token, leaving message unacknowledged");
                return;
            }
        };

        let mut device = DeviceState::new(event.device_id);
        device.states = states;
        let callback = StateCallback::new(credentials.access_token, vec![device]);

        if let Err(e) = self
            .sender
            .send(&credentials.state_callback_url, &callback)
            .await
        {
            PipelineStats::incr(&self.stats.failed);
            tracing::error!(error = %e, "State callback failed, leaving message unacknowledged");
            return;
        }

        match self.feed.acknowledge(std::slice::from_ref(&event.ack_id)).await {
            Ok(()) => {
                PipelineStats::incr(&self.stats.forwarded);
                tracing::debug!("State callback delivered");
            }
            Err(e) => {
                PipelineStats::incr(&self.stats.failed);
                tracing::warn!(error = %e, "Delivered but failed to acknowledge");
            }
        }
    }
}
