//! Core types shared across the engine and its FFI clients.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Width of tokens issued after the token-format migration.
pub const TOKEN_WIDTH: usize = 32;

/// Width of pre-migration tokens still printed on some QR codes.
pub const LEGACY_TOKEN_WIDTH: usize = 64;

/// Session label used when the server does not name one.
pub const DEFAULT_SESSION_LABEL: &str = "Default";

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// `{activityId, token}` extracted from a QR code.
///
/// Produced once per successful decode and dropped when verification
/// finishes, so a payload can never be replayed into a second submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase")]
pub struct DecodedPayload {
    pub activity_id: String,
    pub token: String,
}

/// The server's canonical token for an activity. Fetched fresh per attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTokenInfo {
    pub token: String,
    pub activity_name: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Why a session ended without a check-in. Each reason has its own remedy,
/// so hosts can branch on it instead of on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    PermissionDenied,
    DeviceNotFound,
    DeviceBusy,
    CameraUnavailable,
    InvalidPayload,
    NoActiveToken,
    TokenMismatch,
    Network,
    Timeout,
    ServerRejected { status: u16 },
    MalformedResponse,
    NoCodeInImage,
    ImageUnreadable,
}

impl RejectReason {
    /// Message shown when the server did not supply one.
    pub fn default_message(&self) -> &'static str {
        match self {
            RejectReason::PermissionDenied => {
                "Camera access was denied. Allow camera permission for this app, then start the camera again."
            }
            RejectReason::DeviceNotFound => {
                "No camera device was found. Check that a camera is connected."
            }
            RejectReason::DeviceBusy => {
                "The camera is being used by another application. Close it and try again."
            }
            RejectReason::CameraUnavailable => {
                "Unable to access the camera. Check camera permissions and try again."
            }
            RejectReason::InvalidPayload => "Invalid QR code.",
            RejectReason::NoActiveToken => {
                "This activity has no QR code yet. Please contact an administrator."
            }
            RejectReason::TokenMismatch => {
                "QR code does not match or has expired. Please generate a new QR code."
            }
            RejectReason::Network => {
                "Could not reach the server. Check your connection and try again."
            }
            RejectReason::Timeout => "The server took too long to respond. Please try again.",
            RejectReason::ServerRejected { .. } | RejectReason::MalformedResponse => {
                "Unable to verify the QR code. Please try again."
            }
            RejectReason::NoCodeInImage => {
                "No QR code found in the image. Try again with a sharper photo."
            }
            RejectReason::ImageUnreadable => {
                "Unable to read the image. Please choose a valid image file."
            }
        }
    }
}

pub const SUCCESS_MESSAGE: &str = "Check-in successful!";
pub const ALREADY_CHECKED_IN_MESSAGE: &str = "You have already checked in to this activity.";

/// Terminal, user-visible result of one scan session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanOutcome {
    Success {
        activity_id: String,
        activity_name: String,
        session_label: String,
        timestamp: String,
    },
    AlreadyCheckedIn {
        detail: Option<String>,
    },
    Rejected {
        reason: RejectReason,
        message: String,
    },
}

impl ScanOutcome {
    pub fn rejected(reason: RejectReason) -> Self {
        ScanOutcome::Rejected {
            reason,
            message: reason.default_message().to_string(),
        }
    }

    /// Rejection that prefers the server's wording when it sent any.
    pub fn rejected_with(reason: RejectReason, message: Option<&str>) -> Self {
        match message.map(str::trim).filter(|m| !m.is_empty()) {
            Some(message) => ScanOutcome::Rejected {
                reason,
                message: message.to_string(),
            },
            None => Self::rejected(reason),
        }
    }

    /// The single message shown for this outcome.
    pub fn message(&self) -> &str {
        match self {
            ScanOutcome::Success { .. } => SUCCESS_MESSAGE,
            ScanOutcome::AlreadyCheckedIn { .. } => ALREADY_CHECKED_IN_MESSAGE,
            ScanOutcome::Rejected { message, .. } => message,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScanOutcome::Success { .. })
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            ScanOutcome::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session State
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of one scan session.
///
/// ```text
/// Idle → Starting → Scanning → Decoding → Verifying → Submitting → Terminal → Idle
/// ```
///
/// A capture handle exists only while `Starting` or `Scanning`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, uniffi::Enum)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Scanning,
    Decoding {
        candidate: String,
    },
    Verifying,
    Submitting,
    Terminal {
        outcome: ScanOutcome,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Scanning => "scanning",
            SessionState::Decoding { .. } => "decoding",
            SessionState::Verifying => "verifying",
            SessionState::Submitting => "submitting",
            SessionState::Terminal { .. } => "terminal",
        }
    }

    /// States in which the capture device may be held.
    pub fn holds_capture(&self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Scanning)
    }

    /// States with a verification or submission in flight.
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            SessionState::Decoding { .. } | SessionState::Verifying | SessionState::Submitting
        )
    }

    /// States from which a new session may start.
    pub fn is_settled(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Terminal { .. })
    }

    pub fn outcome(&self) -> Option<&ScanOutcome> {
        match self {
            SessionState::Terminal { outcome } => Some(outcome),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capture / Decode descriptors
// ─────────────────────────────────────────────────────────────────────────────

/// Which camera to prefer. Back-facing (`Environment`) is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    Environment,
    User,
}

/// Which cascade strategy produced a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStrategy {
    NativeDetector,
    ContinuousDecoder,
    FrameSampling,
    StillImage,
    /// Supplied by the host through `ScanSession::handle_decoded`.
    External,
}

impl fmt::Display for DecodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecodeStrategy::NativeDetector => "native_detector",
            DecodeStrategy::ContinuousDecoder => "continuous_decoder",
            DecodeStrategy::FrameSampling => "frame_sampling",
            DecodeStrategy::StillImage => "still_image",
            DecodeStrategy::External => "external",
        };
        f.write_str(name)
    }
}

/// Broadcast after a successful check-in so other views can refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceUpdated {
    pub activity_id: String,
    pub at_millis: i64,
}

/// Shortened token for logs: first 10 characters plus the length.
pub fn token_preview(token: &str) -> String {
    let prefix: String = token.chars().take(10).collect();
    format!("{}... ({} chars)", prefix, token.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_with_prefers_server_message() {
        let outcome = ScanOutcome::rejected_with(
            RejectReason::ServerRejected { status: 400 },
            Some("Registration not approved"),
        );
        assert_eq!(outcome.message(), "Registration not approved");
    }

    #[test]
    fn rejected_with_blank_message_uses_default() {
        let outcome = ScanOutcome::rejected_with(RejectReason::Network, Some("   "));
        assert_eq!(outcome.message(), RejectReason::Network.default_message());
        assert_eq!(outcome.reject_reason(), Some(RejectReason::Network));
    }

    #[test]
    fn verification_failures_have_distinct_remedies() {
        assert_ne!(
            RejectReason::NoActiveToken.default_message(),
            RejectReason::TokenMismatch.default_message()
        );
        assert!(RejectReason::NoActiveToken
            .default_message()
            .contains("administrator"));
        assert!(RejectReason::TokenMismatch
            .default_message()
            .contains("new QR code"));
    }

    #[test]
    fn capture_states() {
        assert!(SessionState::Starting.holds_capture());
        assert!(SessionState::Scanning.holds_capture());
        assert!(!SessionState::Verifying.holds_capture());
        assert!(SessionState::Verifying.is_processing());
        assert!(SessionState::Idle.is_settled());
        assert!(SessionState::Terminal {
            outcome: ScanOutcome::rejected(RejectReason::InvalidPayload)
        }
        .is_settled());
    }

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let json = serde_json::to_value(ScanOutcome::AlreadyCheckedIn { detail: None }).unwrap();
        assert_eq!(json["kind"], "already_checked_in");
    }

    #[test]
    fn token_preview_truncates() {
        assert_eq!(token_preview("abcdefghijklmnop"), "abcdefghij... (16 chars)");
        assert_eq!(token_preview("abc"), "abc... (3 chars)");
    }
}
