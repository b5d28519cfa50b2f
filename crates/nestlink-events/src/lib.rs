//! NestLink Events
//!
//! Ingestion of Device Access resource updates from Pub/Sub and their
//! delivery to the SmartThings state callback.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────┐ pull ≤10 ┌──────────┐ handoff (cap 1) ┌─────────────┐
//!  │EventFeed │─────────▶│  Puller  │────────────────▶│  Publisher  │
//!  │ (Pub/Sub)│◀─────────│age filter│                 │ 10 workers  │
//!  └──────────┘ ack stale└──────────┘                 └──────┬──────┘
//!       ▲                                                    │ translate
//!       │                 ack on 200/204                     ▼
//!       └──────────────────────────────────────── StateCallback POST
//! ```
//!
//! Delivery is at least once: a message is acknowledged only after the
//! callback succeeded, or when it is too old to be worth delivering.

pub mod callback;
pub mod envelope;
pub mod error;
pub mod feed;
pub mod pipeline;
pub mod publisher;
pub mod pubsub;
pub mod puller;

pub use callback::{CallbackSender, HttpCallbackSender};
pub use envelope::{Disposition, EnvelopeDecoder, SdmEvent};
pub use error::{CallbackError, FeedError};
pub use feed::{EventFeed, ReceivedMessage};
pub use pipeline::{Pipeline, PipelineConfig, PipelineStats, StatsSnapshot};
pub use publisher::Publisher;
pub use pubsub::{FeedTokenSource, PubSubClient, PubSubConfig};
pub use puller::Puller;
