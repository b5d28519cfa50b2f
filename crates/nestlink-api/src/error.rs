//! API errors.
//!
//! Protocol-level failures are answered with an ST-Schema global or device
//! error and never reach this module. What remains maps onto an HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nestlink_core::ValidationError;
use nestlink_oauth::OAuthError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HandlerError>;

/// Why a request body was rejected.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Content-Type header is not application/json: {0}")]
    ContentType(String),

    #[error("request body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("unable to parse JSON: {0}")]
    Parse(String),

    #[error("input validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Handler failures without a protocol error shape.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The device API failed for a reason other than the token.
    #[error("Down-stream API error: {0}")]
    Downstream(String),

    /// Token exchange or persistence failed while granting callback access.
    #[error("Callback access grant failed: {0}")]
    Grant(#[from] OAuthError),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Request(_) => StatusCode::BAD_REQUEST,
            HandlerError::Downstream(_) => StatusCode::BAD_GATEWAY,
            HandlerError::Grant(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            HandlerError::Request(RequestError::Parse(_)) => "unable to parse JSON".to_string(),
            HandlerError::Request(RequestError::Validation(_)) => {
                "input validation failed".to_string()
            }
            HandlerError::Downstream(_) => "Down-stream API error".to_string(),
            HandlerError::Grant(_) => "unable to grant callback access".to_string(),
            other => other.to_string(),
        };
        (status, message).into_response()
    }
}
