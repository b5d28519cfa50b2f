//! OAuth errors.

use thiserror::Error;

/// Result type for OAuth operations.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Errors from the token lifecycle.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// No usable token and no refresh token; a new authorization code grant is needed.
    #[error("Reauthorization required: access token expired or missing and no refresh token held")]
    ReauthorizationRequired,

    /// Token exchanges need the connector's client secret.
    #[error("No client secret configured, cannot run the {0} grant")]
    MissingClientSecret(&'static str),

    /// The token endpoint could not be reached.
    #[error("Communication error: {0}")]
    Transport(String),

    /// The token endpoint answered with something other than 200.
    #[error("Token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The token endpoint answered 200 with an undecodable body.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The token endpoint answered with the wrong interaction type.
    #[error("Got interaction type {0}, expected accessTokenResponse")]
    UnexpectedInteractionType(String),

    /// The state file could not be read or written.
    #[error("State file error: {0}")]
    Persist(String),
}
