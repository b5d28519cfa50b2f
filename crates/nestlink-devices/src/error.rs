//! Device API errors.

use nestlink_core::{DeviceError, DeviceErrorKind};
use thiserror::Error;

use crate::traits::TraitError;

/// Result type for device API operations.
pub type Result<T> = std::result::Result<T, SdmError>;

/// Errors from the Smart Device Management API.
#[derive(Debug, Error)]
pub enum SdmError {
    /// The request never produced an HTTP response (connect, timeout, TLS).
    #[error("Communication error: {0}")]
    Transport(String),

    /// The API answered with a non-success status.
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        /// Provider reason codes, e.g. `failedPrecondition`.
        reasons: Vec<String>,
    },

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A device's traits could not be decoded.
    #[error(transparent)]
    Traits(#[from] TraitError),
}

impl SdmError {
    pub fn status(&self) -> Option<u16> {
        match self {
            SdmError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The bearer token was rejected.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn has_reason(&self, reason: &str) -> bool {
        match self {
            SdmError::Api { reasons, .. } => reasons.iter().any(|r| r == reason),
            _ => false,
        }
    }

    /// Whether the failure affects the whole request rather than one device.
    ///
    /// `device_scoped` tells whether the failing call addressed a single
    /// device. Only a 400 on such a call stays per-device.
    pub fn is_global(&self, device_scoped: bool) -> bool {
        match self.status() {
            Some(400) => !device_scoped,
            _ => true,
        }
    }

    /// Per-device protocol error for this failure.
    pub fn device_error(&self) -> DeviceError {
        match self {
            SdmError::Api { message, .. } if self.has_reason("failedPrecondition") => {
                DeviceError::new(DeviceErrorKind::ResourceConstraintViolation, message.clone())
            }
            SdmError::Api { message, .. } => {
                DeviceError::new(DeviceErrorKind::DeviceUnavailable, message.clone())
            }
            _ => DeviceError::new(DeviceErrorKind::DeviceUnavailable, "device unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, reasons: &[&str]) -> SdmError {
        SdmError::Api {
            status,
            message: "boom".to_string(),
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_global_classification() {
        assert!(api(401, &[]).is_global(true));
        assert!(api(401, &[]).is_global(false));
        assert!(!api(400, &[]).is_global(true));
        assert!(api(400, &[]).is_global(false));
        assert!(api(500, &[]).is_global(true));
        assert!(api(404, &[]).is_global(true));
        assert!(SdmError::Transport("reset".into()).is_global(true));
        assert!(SdmError::Decode("eof".into()).is_global(false));
    }

    #[test]
    fn test_device_error_mapping() {
        let err = api(400, &["failedPrecondition"]).device_error();
        assert_eq!(err.error_enum, DeviceErrorKind::ResourceConstraintViolation);
        assert_eq!(err.detail, "boom");

        let err = api(400, &["badRequest"]).device_error();
        assert_eq!(err.error_enum, DeviceErrorKind::DeviceUnavailable);
        assert_eq!(err.detail, "boom");

        let err = SdmError::Transport("reset".into()).device_error();
        assert_eq!(err.error_enum, DeviceErrorKind::DeviceUnavailable);
        assert_eq!(err.detail, "device unavailable");
    }

    #[test]
    fn test_unauthorized() {
        assert!(api(401, &[]).is_unauthorized());
        assert!(!api(403, &[]).is_unauthorized());
        assert!(!SdmError::Transport("x".into()).is_unauthorized());
    }
}
