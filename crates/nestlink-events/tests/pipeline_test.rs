//! Event pipeline against an in-memory feed and callback recorder.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use nestlink_core::StateCallback;
use nestlink_events::{
    CallbackError, CallbackSender, EventFeed, FeedError, Pipeline, PipelineConfig,
    PipelineStats, ReceivedMessage, StatsSnapshot,
};
use nestlink_oauth::{CallbackCredentials, OAuthError, TokenProvider};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::Span;

#[derive(Default)]
struct MemoryFeed {
    batches: Mutex<VecDeque<Result<Vec<ReceivedMessage>, FeedError>>>,
    ack_calls: Mutex<Vec<Vec<String>>>,
}

impl MemoryFeed {
    fn with_batches(batches: Vec<Result<Vec<ReceivedMessage>, FeedError>>) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(batches.into()),
            ack_calls: Mutex::new(Vec::new()),
        })
    }

    fn acked(&self) -> Vec<String> {
        self.ack_calls.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl EventFeed for MemoryFeed {
    async fn pull(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>, FeedError> {
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => {
                if let Ok(messages) = &batch {
                    assert!(messages.len() <= max_messages);
                }
                batch
            }
            None => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<(), FeedError> {
        self.ack_calls.lock().unwrap().push(ack_ids.to_vec());
        Ok(())
    }
}

struct FakeTokens {
    fail: bool,
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn callback_credentials(&self) -> Result<CallbackCredentials, OAuthError> {
        if self.fail {
            return Err(OAuthError::ReauthorizationRequired);
        }
        Ok(CallbackCredentials {
            state_callback_url: "http://smartthings.invalid/callback".to_string(),
            access_token: "st-token".to_string(),
        })
    }
}

struct RecordingSender {
    feed: Arc<MemoryFeed>,
    delay: Duration,
    fail: AtomicBool,
    sent: Mutex<Vec<(String, Value)>>,
    /// Ack ids already acknowledged when each callback was sent.
    acked_before_send: Mutex<Vec<Vec<String>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingSender {
    fn new(feed: Arc<MemoryFeed>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            feed,
            delay,
            fail: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            acked_before_send: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallbackSender for RecordingSender {
    async fn send(&self, url: &str, callback: &StateCallback) -> Result<(), CallbackError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.acked_before_send.lock().unwrap().push(self.feed.acked());

        tokio::time::sleep(self.delay).await;

        self.sent
            .lock()
            .unwrap()
            .push((url.to_string(), serde_json::to_value(callback).unwrap()));
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(CallbackError::Status {
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(())
    }
}

fn encode(body: &Value) -> String {
    STANDARD.encode(serde_json::to_vec(body).unwrap())
}

fn message(ack_id: &str, body: &Value, publish_time: String) -> ReceivedMessage {
    ReceivedMessage {
        ack_id: ack_id.to_string(),
        message_id: format!("msg-{}", ack_id),
        data: encode(body),
        publish_time,
        delivery_attempt: None,
    }
}

fn connectivity(device: &str, status: &str) -> Value {
    json!({
        "eventId": format!("evt-{}", device),
        "timestamp": Utc::now().to_rfc3339(),
        "resourceUpdate": {
            "name": format!("enterprises/proj-1/devices/{}", device),
            "traits": { "sdm.devices.traits.Connectivity": { "status": status } }
        },
        "userId": "user-1"
    })
}

fn fresh(ack_id: &str, body: &Value) -> ReceivedMessage {
    message(ack_id, body, Utc::now().to_rfc3339())
}

fn stale(ack_id: &str) -> ReceivedMessage {
    let published = Utc::now() - chrono::Duration::hours(2);
    message(ack_id, &connectivity("old", "ONLINE"), published.to_rfc3339())
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::new("proj-1");
    config.pull_backoff = 0;
    config
}

struct Running {
    cancel: CancellationToken,
    stats: Arc<PipelineStats>,
    handle: tokio::task::JoinHandle<StatsSnapshot>,
}

impl Running {
    async fn stop(self) -> StatsSnapshot {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("pipeline did not stop")
            .unwrap()
    }
}

fn start(
    feed: Arc<MemoryFeed>,
    tokens: FakeTokens,
    sender: Arc<RecordingSender>,
    config: PipelineConfig,
) -> Running {
    let pipeline = Pipeline::new(feed, Arc::new(tokens), sender, config, Span::none());
    let stats = pipeline.stats();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(pipeline.run(cancel.clone()));
    Running {
        cancel,
        stats,
        handle,
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_connectivity_event_is_forwarded_then_acknowledged() {
    let feed = MemoryFeed::with_batches(vec![Ok(vec![fresh("ack-abc", &connectivity("abc", "ONLINE"))])]);
    let sender = RecordingSender::new(feed.clone(), Duration::ZERO);
    let running = start(feed.clone(), FakeTokens { fail: false }, sender.clone(), config());

    wait_for(|| feed.acked().contains(&"ack-abc".to_string())).await;
    let stats = running.stop().await;

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    let (url, body) = &sent[0];
    assert_eq!(url, "http://smartthings.invalid/callback");
    assert_eq!(body["headers"]["interactionType"], "stateCallback");
    assert_eq!(body["authentication"]["tokenType"], "Bearer");
    assert_eq!(body["authentication"]["token"], "st-token");

    let device = &body["deviceState"][0];
    assert_eq!(device["externalDeviceId"], "abc");
    let states = device["states"].as_array().unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(states[0]["component"], "main");
    assert_eq!(states[0]["capability"], "st.healthCheck");
    assert_eq!(states[0]["attribute"], "healthStatus");
    assert_eq!(states[0]["value"], "online");
    assert_eq!(states[1]["capability"], "st.healthcheck");
    assert_eq!(states[1]["value"], "offline");

    // Not acknowledged before the callback went out.
    assert!(sender.acked_before_send.lock().unwrap()[0].is_empty());
    assert_eq!(stats.forwarded, 1);
    assert_eq!(stats.dispatched, 1);
}

#[tokio::test]
async fn test_stale_messages_are_acknowledged_in_one_batch() {
    let feed = MemoryFeed::with_batches(vec![Ok(vec![stale("s1"), stale("s2"), stale("s3")])]);
    let sender = RecordingSender::new(feed.clone(), Duration::ZERO);
    let running = start(feed.clone(), FakeTokens { fail: false }, sender.clone(), config());

    wait_for(|| !feed.ack_calls.lock().unwrap().is_empty()).await;
    let stats = running.stop().await;

    assert_eq!(
        feed.ack_calls.lock().unwrap().clone(),
        vec![vec!["s1".to_string(), "s2".to_string(), "s3".to_string()]]
    );
    assert!(sender.sent().is_empty());
    assert_eq!(stats.stale, 3);
    assert_eq!(stats.dispatched, 0);
}

#[tokio::test]
async fn test_failed_callback_leaves_message_unacknowledged() {
    let feed = MemoryFeed::with_batches(vec![Ok(vec![fresh("a1", &connectivity("abc", "OFFLINE"))])]);
    let sender = RecordingSender::new(feed.clone(), Duration::ZERO);
    sender.fail.store(true, Ordering::SeqCst);
    let running = start(feed.clone(), FakeTokens { fail: false }, sender.clone(), config());

    wait_for(|| sender.sent().len() == 1).await;
    let stats = running.stop().await;

    assert!(feed.acked().is_empty());
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.forwarded, 0);
}

#[tokio::test]
async fn test_token_failure_leaves_message_unacknowledged() {
    let feed = MemoryFeed::with_batches(vec![Ok(vec![fresh("a1", &connectivity("abc", "ONLINE"))])]);
    let sender = RecordingSender::new(feed.clone(), Duration::ZERO);
    let running = start(feed.clone(), FakeTokens { fail: true }, sender.clone(), config());

    let counters = running.stats.clone();
    wait_for(|| counters.snapshot().failed == 1).await;
    let stats = running.stop().await;

    assert!(sender.sent().is_empty());
    assert!(feed.acked().is_empty());
    assert_eq!(stats.forwarded, 0);
}

#[tokio::test]
async fn test_malformed_and_non_update_messages_are_dropped_without_ack() {
    let mut garbage = fresh("bad", &json!({}));
    garbage.data = "not base64 at all %%%".to_string();
    let relation = fresh(
        "rel",
        &json!({
            "eventId": "e",
            "timestamp": Utc::now().to_rfc3339(),
            "relationUpdate": { "type": "CREATED" }
        }),
    );

    let feed = MemoryFeed::with_batches(vec![Ok(vec![
        garbage,
        relation,
        fresh("good", &connectivity("abc", "ONLINE")),
    ])]);
    let sender = RecordingSender::new(feed.clone(), Duration::ZERO);
    let running = start(feed.clone(), FakeTokens { fail: false }, sender.clone(), config());

    wait_for(|| feed.acked().contains(&"good".to_string())).await;
    let stats = running.stop().await;

    assert_eq!(feed.acked(), vec!["good".to_string()]);
    assert_eq!(sender.sent().len(), 1);
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.ignored, 1);
    assert_eq!(stats.pulled, 3);
}

#[tokio::test]
async fn test_pull_error_is_retried() {
    let feed = MemoryFeed::with_batches(vec![
        Err(FeedError::Transport("connection reset".to_string())),
        Ok(vec![fresh("a1", &connectivity("abc", "ONLINE"))]),
    ]);
    let sender = RecordingSender::new(feed.clone(), Duration::ZERO);
    let running = start(feed.clone(), FakeTokens { fail: false }, sender.clone(), config());

    wait_for(|| feed.acked().contains(&"a1".to_string())).await;
    let stats = running.stop().await;
    assert_eq!(stats.forwarded, 1);
}

#[tokio::test]
async fn test_worker_pool_is_bounded() {
    let batches: Vec<Result<Vec<ReceivedMessage>, FeedError>> = (0..3)
        .map(|b| {
            let batch: Vec<ReceivedMessage> = (0..10)
                .map(|i| {
                    let id = format!("d{}-{}", b, i);
                    fresh(&id, &connectivity(&id, "ONLINE"))
                })
                .collect();
            Ok(batch)
        })
        .collect();
    let feed = MemoryFeed::with_batches(batches);
    let sender = RecordingSender::new(feed.clone(), Duration::from_millis(50));
    let running = start(feed.clone(), FakeTokens { fail: false }, sender.clone(), config());

    wait_for(|| feed.acked().len() == 30).await;
    let stats = running.stop().await;

    let max_active = sender.max_active.load(Ordering::SeqCst);
    assert!(max_active <= 10, "max active workers {}", max_active);
    assert!(max_active > 1);
    assert_eq!(stats.forwarded, 30);
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_workers() {
    let feed = MemoryFeed::with_batches(vec![Ok(vec![fresh("slow", &connectivity("abc", "ONLINE"))])]);
    let sender = RecordingSender::new(feed.clone(), Duration::from_millis(300));
    let running = start(feed.clone(), FakeTokens { fail: false }, sender.clone(), config());

    wait_for(|| sender.active.load(Ordering::SeqCst) == 1).await;
    let stats = running.stop().await;

    assert_eq!(feed.acked(), vec!["slow".to_string()]);
    assert_eq!(stats.forwarded, 1);
}

#[tokio::test]
async fn test_blocked_handoff_is_abandoned_on_shutdown() {
    let feed = MemoryFeed::with_batches(vec![Ok(vec![
        fresh("a1", &connectivity("d1", "ONLINE")),
        fresh("a2", &connectivity("d2", "ONLINE")),
        fresh("a3", &connectivity("d3", "ONLINE")),
    ])]);
    let sender = RecordingSender::new(feed.clone(), Duration::from_millis(300));
    let mut single = config();
    single.workers = 1;
    let running = start(feed.clone(), FakeTokens { fail: false }, sender.clone(), single);

    // a1 is with the only worker, a2 sits in the handoff slot, a3 is blocked.
    let counters = running.stats.clone();
    wait_for(|| sender.active.load(Ordering::SeqCst) == 1 && counters.snapshot().dispatched == 2).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = std::time::Instant::now();
    let stats = running.stop().await;
    assert!(started.elapsed() < Duration::from_secs(2), "stop took {:?}", started.elapsed());

    assert_eq!(feed.acked(), vec!["a1".to_string(), "a2".to_string()]);
    let devices: Vec<String> = sender
        .sent()
        .iter()
        .map(|(_, body)| body["deviceState"][0]["externalDeviceId"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(devices, vec!["d1".to_string(), "d2".to_string()]);
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.forwarded, 2);
}

#[tokio::test]
async fn test_cancel_before_start_stops_immediately() {
    let feed = MemoryFeed::with_batches(vec![Ok(vec![fresh("a1", &connectivity("abc", "ONLINE"))])]);
    let sender = RecordingSender::new(feed.clone(), Duration::ZERO);
    let pipeline = Pipeline::new(
        feed.clone(),
        Arc::new(FakeTokens { fail: false }),
        sender.clone(),
        config(),
        Span::none(),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let stats = pipeline.run(cancel).await;

    assert_eq!(stats, StatsSnapshot::default());
    assert!(sender.sent().is_empty());
}
