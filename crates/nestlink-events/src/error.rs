//! Event pipeline errors.

use thiserror::Error;

/// Errors from the event feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Communication error: {0}")]
    Transport(String),

    #[error("Feed request timed out")]
    Timeout,

    #[error("Feed API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    /// No bearer token for the feed could be obtained.
    #[error("Feed credentials error: {0}")]
    Credentials(String),
}

/// Errors delivering a state callback.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Communication error: {0}")]
    Transport(String),

    /// Anything but 200 or 204.
    #[error("State callback returned {status}: {body}")]
    Status { status: u16, body: String },
}
