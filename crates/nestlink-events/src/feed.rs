//! Event feed seam.

use async_trait::async_trait;

use crate::error::FeedError;

/// One message as delivered by the feed, before any decoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub message_id: String,
    /// Base64 encoded event body.
    pub data: String,
    /// RFC 3339 publish time as reported by the feed.
    pub publish_time: String,
    pub delivery_attempt: Option<i32>,
}

/// A pull-based message feed with explicit acknowledgement.
///
/// `pull` may block while the feed has nothing to deliver; callers cancel it
/// by dropping the future.
#[async_trait]
pub trait EventFeed: Send + Sync {
    async fn pull(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>, FeedError>;

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<(), FeedError>;
}
