//! `image` and `payload`: full verify-and-check-in runs without a camera.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use scan_core::{
    CaptureRequest, HeadlessSurface, HttpAttendanceApi, NoCameraBackend, ResourceController,
    ScanConfig, ScanOutcome, ScanSession, StorageConfig,
};

fn session(config: &ScanConfig, storage: &StorageConfig) -> Result<ScanSession, String> {
    let api = Arc::new(HttpAttendanceApi::new(&config.api)?);
    let controller = Arc::new(ResourceController::new(
        Arc::new(NoCameraBackend),
        Arc::new(HeadlessSurface::new()),
        CaptureRequest::from_config(&config.capture),
    ));
    Ok(ScanSession::builder(controller, api)
        .from_config(config, storage)
        .build())
}

pub async fn image(
    config: &ScanConfig,
    storage: &StorageConfig,
    path: &Path,
    json: bool,
) -> Result<ExitCode, String> {
    let bytes = fs_err::read(path).map_err(|e| e.to_string())?;
    let session = session(config, storage)?;

    let outcome = if session.scan_image(bytes).await {
        session.wait_for_outcome().await
    } else {
        session.last_outcome()
    };
    report(outcome, json)
}

pub async fn payload(
    config: &ScanConfig,
    storage: &StorageConfig,
    raw: String,
    json: bool,
) -> Result<ExitCode, String> {
    let session = session(config, storage)?;
    if !session.handle_decoded(raw) {
        return Err("empty payload".to_string());
    }
    report(session.wait_for_outcome().await, json)
}

fn report(outcome: Option<ScanOutcome>, json: bool) -> Result<ExitCode, String> {
    let outcome = outcome.ok_or("scan ended without an outcome")?;
    if json {
        let body = serde_json::to_string_pretty(&outcome).map_err(|e| e.to_string())?;
        println!("{}", body);
    } else {
        println!("{}", describe(&outcome));
    }
    Ok(ExitCode::from(exit_status(&outcome)))
}

fn describe(outcome: &ScanOutcome) -> String {
    match outcome {
        ScanOutcome::Success {
            activity_id,
            activity_name,
            session_label,
            timestamp,
        } => {
            let name = if activity_name.is_empty() {
                activity_id.as_str()
            } else {
                activity_name.as_str()
            };
            format!(
                "{} {} ({}) at {}",
                outcome.message(),
                name,
                session_label,
                timestamp
            )
        }
        ScanOutcome::AlreadyCheckedIn { detail } => match detail {
            Some(detail) => format!("{} ({})", outcome.message(), detail),
            None => outcome.message().to_string(),
        },
        ScanOutcome::Rejected { .. } => outcome.message().to_string(),
    }
}

/// 0 when the student ends up checked in, 2 for any rejection.
fn exit_status(outcome: &ScanOutcome) -> u8 {
    match outcome {
        ScanOutcome::Success { .. } | ScanOutcome::AlreadyCheckedIn { .. } => 0,
        ScanOutcome::Rejected { .. } => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::{RejectReason, ALREADY_CHECKED_IN_MESSAGE};

    #[test]
    fn test_success_names_activity_and_session() {
        let outcome = ScanOutcome::Success {
            activity_id: "A1".to_string(),
            activity_name: "Campus cleanup".to_string(),
            session_label: "Morning".to_string(),
            timestamp: "2026-03-01T08:00:00.000Z".to_string(),
        };
        let text = describe(&outcome);
        assert!(text.contains("Campus cleanup (Morning)"), "{text}");
        assert_eq!(exit_status(&outcome), 0);
    }

    #[test]
    fn test_success_without_name_falls_back_to_id() {
        let outcome = ScanOutcome::Success {
            activity_id: "A1".to_string(),
            activity_name: String::new(),
            session_label: "Default".to_string(),
            timestamp: "t".to_string(),
        };
        assert!(describe(&outcome).contains("A1 (Default)"));
    }

    #[test]
    fn test_already_checked_in_is_not_a_failure() {
        let outcome = ScanOutcome::AlreadyCheckedIn { detail: None };
        assert_eq!(describe(&outcome), ALREADY_CHECKED_IN_MESSAGE);
        assert_eq!(exit_status(&outcome), 0);
    }

    #[test]
    fn test_rejection_exits_nonzero() {
        let outcome = ScanOutcome::rejected(RejectReason::TokenMismatch);
        assert_eq!(exit_status(&outcome), 2);
        assert_eq!(describe(&outcome), RejectReason::TokenMismatch.default_message());
    }
}
