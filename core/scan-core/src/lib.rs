//! # scan-core
//!
//! QR attendance engine shared by every scanner client: camera ownership,
//! the decode cascade, payload normalization, token verification and
//! check-in submission.
//!
//! ## Design Principles
//!
//! - **One owner for the camera**: only `ResourceController` touches tracks,
//!   and it always releases them before any network call.
//! - **Async at the seams**: camera, detector and HTTP collaborators are
//!   async traits; the session runs on whatever tokio runtime the host has.
//! - **Outcomes, not errors**: a session always ends in a `ScanOutcome` the
//!   host can show as-is.
//! - **FFI-ready**: UniFFI annotations on outcomes, states and the pure
//!   helpers. Prefer additive public API changes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scan_core::{HttpAttendanceApi, ResourceController, ScanConfig, ScanSession, StorageConfig};
//!
//! let storage = StorageConfig::default();
//! let config = ScanConfig::load(None, &storage)?;
//! let api = Arc::new(HttpAttendanceApi::new(&config.api)?);
//! let controller = Arc::new(ResourceController::new(camera, surface, request));
//! let session = ScanSession::builder(controller, api)
//!     .from_config(&config, &storage)
//!     .build();
//!
//! session.start().await;
//! let outcome = session.wait_for_outcome().await;
//! ```

// UniFFI scaffolding for Swift/Kotlin/Python bindings
uniffi::setup_scaffolding!();

pub mod api;
pub mod capture;
pub mod config;
pub mod decode;
pub mod error;
pub mod payload;
pub mod session;
pub mod signal;
pub mod storage;
pub mod submit;
pub mod types;
pub mod verify;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use api::{AttendanceApi, HttpAttendanceApi};
pub use capture::headless::{HeadlessSurface, NoCameraBackend};
pub use capture::{
    CameraBackend, CaptureInfo, CaptureRequest, CaptureStream, MediaTrack, RenderSurface,
    ResourceController, TrackCapabilities,
};
pub use config::*;
pub use decode::{
    decode_still_image, ContinuousDecoder, DecodeCascade, Frame, NativeDetector, QrDecoder,
    RqrrDecoder,
};
pub use error::{
    ApiError, CaptureError, DecodeError, PayloadError, Result, ScanError, ScanFfiError,
    VerifyError,
};
pub use session::{ScanSession, ScanSessionBuilder};
pub use signal::{read_marker, AttendanceSignal};
pub use storage::StorageConfig;
pub use submit::AttendanceSubmitter;
pub use types::*;
pub use verify::{tokens_match, TokenVerifier, Verification};

/// Parses a decoded QR string into its activity id and token.
#[uniffi::export]
pub fn normalize_qr_payload(raw: String) -> std::result::Result<DecodedPayload, ScanFfiError> {
    Ok(payload::normalize(&raw)?)
}

/// Whether a scanned token matches the activity's current server token.
#[uniffi::export]
pub fn qr_tokens_match(decoded: String, server: String) -> bool {
    verify::tokens_match(&decoded, &server)
}

/// Decodes the first QR code in a PNG or JPEG.
#[uniffi::export]
pub fn decode_qr_image(bytes: Vec<u8>) -> std::result::Result<String, ScanFfiError> {
    let max_dimension = CascadeConfig::default().image_max_dimension;
    decode_still_image(&bytes, &RqrrDecoder, max_dimension)
        .map_err(|err| ScanFfiError::from(ScanError::from(err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_export_reports_missing_field() {
        let err = normalize_qr_payload(r#"{"activityId":"A1"}"#.to_string()).unwrap_err();
        assert!(err.to_string().contains("token"), "{err}");
    }

    #[test]
    fn test_token_match_export_applies_legacy_width() {
        let server = "a".repeat(32);
        let legacy = format!("{}{}", server, "b".repeat(32));
        assert!(qr_tokens_match(legacy, server.clone()));
        assert!(!qr_tokens_match(String::new(), server));
    }

    #[test]
    fn test_decode_export_reads_png() {
        let png = testing::encode_png(&testing::render_qr("hello", 4));
        assert_eq!(decode_qr_image(png).unwrap(), "hello");
    }
}
