//! Error types for scan-core operations.
//! Keep ScanFfiError minimal and stable to avoid breaking FFI clients.

use std::path::PathBuf;

use crate::types::RejectReason;

// ═══════════════════════════════════════════════════════════════════════════════
// FFI-Compatible Error (for Swift/Kotlin/Python)
// ═══════════════════════════════════════════════════════════════════════════════

/// FFI-safe error type for use across language boundaries.
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ScanFfiError {
    #[error("{message}")]
    General { message: String },
}

impl From<String> for ScanFfiError {
    fn from(message: String) -> Self {
        ScanFfiError::General { message }
    }
}

impl From<&str> for ScanFfiError {
    fn from(message: &str) -> Self {
        ScanFfiError::General {
            message: message.to_string(),
        }
    }
}

impl From<ScanError> for ScanFfiError {
    fn from(err: ScanError) -> Self {
        ScanFfiError::General {
            message: err.to_string(),
        }
    }
}

impl From<PayloadError> for ScanFfiError {
    fn from(err: PayloadError) -> Self {
        ScanFfiError::General {
            message: err.to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Capture Errors (Resource Controller)
// ═══════════════════════════════════════════════════════════════════════════════

/// Platform failures while acquiring or driving the capture device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera device found")]
    DeviceNotFound,

    #[error("camera is busy or unreadable")]
    DeviceBusy,

    #[error("capability not supported by this device: {0}")]
    Unsupported(&'static str),

    #[error("no capture device is active")]
    NotActive,

    #[error("capture acquisition was cancelled")]
    Cancelled,

    #[error("camera platform error: {0}")]
    Platform(String),
}

impl CaptureError {
    /// Maps a platform error name (DOMException-style) onto the taxonomy.
    pub fn from_platform_name(name: &str, detail: impl Into<String>) -> Self {
        match name {
            "NotAllowedError" | "SecurityError" | "PermissionDeniedError" => {
                CaptureError::PermissionDenied
            }
            "NotFoundError" | "DevicesNotFoundError" | "OverconstrainedError" => {
                CaptureError::DeviceNotFound
            }
            "NotReadableError" | "TrackStartError" | "AbortError" => CaptureError::DeviceBusy,
            _ => CaptureError::Platform(detail.into()),
        }
    }

    pub fn reject_reason(&self) -> RejectReason {
        match self {
            CaptureError::PermissionDenied => RejectReason::PermissionDenied,
            CaptureError::DeviceNotFound => RejectReason::DeviceNotFound,
            CaptureError::DeviceBusy => RejectReason::DeviceBusy,
            CaptureError::Unsupported(_)
            | CaptureError::NotActive
            | CaptureError::Cancelled
            | CaptureError::Platform(_) => RejectReason::CameraUnavailable,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decode Errors (Decode Cascade)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("image could not be read: {0}")]
    ImageUnreadable(String),

    #[error("image has invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("no QR code found")]
    NoCodeFound,

    #[error("decoder unavailable: {0}")]
    Unavailable(String),
}

impl DecodeError {
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            DecodeError::NoCodeFound => RejectReason::NoCodeInImage,
            DecodeError::ImageUnreadable(_)
            | DecodeError::InvalidDimensions { .. }
            | DecodeError::Unavailable(_) => RejectReason::ImageUnreadable,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Payload Errors (Payload Normalizer)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("QR payload is not JSON: {0}")]
    NotJson(String),

    #[error("QR payload is missing field `{0}`")]
    MissingField(&'static str),
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Errors (HTTP collaborators)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("server returned {status}")]
    Status {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Timeout | ApiError::Network(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Verification Errors (Token Verifier)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("activity has no active QR token")]
    ActivityHasNoToken,

    #[error("QR info lookup failed: {0}")]
    Lookup(#[from] ApiError),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Umbrella Error
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur in scan-core operations.
///
/// The session never lets these escape; they become a terminal `ScanOutcome`.
/// Hosts that drive components directly see them as-is.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid API base URL {url}: {details}")]
    InvalidBaseUrl { url: String, details: String },
}

/// Convenience type alias for Results using ScanError.
pub type Result<T> = std::result::Result<T, ScanError>;

impl From<ScanError> for String {
    fn from(err: ScanError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_names_map_to_distinct_causes() {
        assert_eq!(
            CaptureError::from_platform_name("NotAllowedError", ""),
            CaptureError::PermissionDenied
        );
        assert_eq!(
            CaptureError::from_platform_name("NotFoundError", ""),
            CaptureError::DeviceNotFound
        );
        assert_eq!(
            CaptureError::from_platform_name("NotReadableError", ""),
            CaptureError::DeviceBusy
        );
        assert_eq!(
            CaptureError::from_platform_name("WeirdError", "boom"),
            CaptureError::Platform("boom".to_string())
        );
    }

    #[test]
    fn capture_reasons_stay_distinct() {
        assert_eq!(
            CaptureError::PermissionDenied.reject_reason(),
            RejectReason::PermissionDenied
        );
        assert_eq!(
            CaptureError::DeviceBusy.reject_reason(),
            RejectReason::DeviceBusy
        );
        assert_eq!(
            CaptureError::Platform("x".into()).reject_reason(),
            RejectReason::CameraUnavailable
        );
    }

    #[test]
    fn server_message_only_for_status_errors() {
        let err = ApiError::Status {
            status: 400,
            code: None,
            message: Some("Token is required".to_string()),
        };
        assert_eq!(err.server_message(), Some("Token is required"));
        assert!(!err.is_transport());
        assert!(ApiError::Timeout.is_transport());
        assert_eq!(ApiError::Timeout.server_message(), None);
    }
}
