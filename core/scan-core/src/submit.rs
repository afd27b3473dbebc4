//! Attendance submitter: posts the verified token and classifies the reply.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use qr_scan_protocol::is_already_checked_in;

use crate::api::AttendanceApi;
use crate::error::ApiError;
use crate::signal::AttendanceSignal;
use crate::types::{DecodedPayload, RejectReason, ScanOutcome, ServerTokenInfo, DEFAULT_SESSION_LABEL};

pub struct AttendanceSubmitter {
    api: Arc<dyn AttendanceApi>,
    signal: AttendanceSignal,
}

impl AttendanceSubmitter {
    pub fn new(api: Arc<dyn AttendanceApi>, signal: AttendanceSignal) -> Self {
        Self { api, signal }
    }

    /// Submits the decoded token. The server applies the same legacy-width
    /// rule as the verifier, so the token goes out as scanned.
    pub async fn submit(&self, payload: &DecodedPayload, info: &ServerTokenInfo) -> ScanOutcome {
        let token = payload.token.trim();
        match self.api.submit_scan(&payload.activity_id, token).await {
            Ok(receipt) => {
                let activity_id = receipt
                    .activity_id
                    .clone()
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| payload.activity_id.clone());
                let activity_name = receipt
                    .activity_name
                    .clone()
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| info.activity_name.clone());
                let session_label = receipt
                    .session_name
                    .clone()
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_SESSION_LABEL.to_string());
                let timestamp = receipt.normalized_timestamp().unwrap_or_else(|| {
                    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
                });

                tracing::info!(
                    activity_id = %activity_id,
                    attendance_id = receipt.attendance_id.as_deref().unwrap_or("-"),
                    "Check-in recorded"
                );
                self.signal.emit(&activity_id);

                ScanOutcome::Success {
                    activity_id,
                    activity_name,
                    session_label,
                    timestamp,
                }
            }
            Err(err) => {
                let outcome = classify_failure(&err);
                tracing::info!(
                    activity_id = %payload.activity_id,
                    error = %err,
                    outcome = ?outcome.reject_reason(),
                    "Check-in not recorded"
                );
                outcome
            }
        }
    }
}

/// Maps a submission failure onto the terminal outcome.
pub fn classify_failure(err: &ApiError) -> ScanOutcome {
    match err {
        ApiError::Status {
            status,
            code,
            message,
        } if is_already_checked_in(*status, code.as_deref()) => {
            ScanOutcome::AlreadyCheckedIn {
                detail: message.clone(),
            }
        }
        ApiError::Status {
            status, message, ..
        } => ScanOutcome::rejected_with(
            RejectReason::ServerRejected { status: *status },
            message.as_deref(),
        ),
        ApiError::Timeout => ScanOutcome::rejected(RejectReason::Timeout),
        ApiError::Network(_) => ScanOutcome::rejected(RejectReason::Network),
        ApiError::Decode(_) => ScanOutcome::rejected(RejectReason::MalformedResponse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use crate::types::ALREADY_CHECKED_IN_MESSAGE;
    use qr_scan_protocol::ALREADY_CHECKED_IN;
    use qr_scan_protocol::ScanReceipt;

    fn payload() -> DecodedPayload {
        DecodedPayload {
            activity_id: "A1".to_string(),
            token: " tok123 ".to_string(),
        }
    }

    fn info() -> ServerTokenInfo {
        ServerTokenInfo {
            token: "tok123".to_string(),
            activity_name: "Campus cleanup".to_string(),
        }
    }

    #[test]
    fn test_conflict_with_already_checked_in_code() {
        let outcome = classify_failure(&ApiError::Status {
            status: 409,
            code: Some(ALREADY_CHECKED_IN.to_string()),
            message: Some("Already checked in".to_string()),
        });
        assert!(matches!(outcome, ScanOutcome::AlreadyCheckedIn { .. }));
        assert_eq!(outcome.message(), ALREADY_CHECKED_IN_MESSAGE);
    }

    #[test]
    fn test_conflict_with_other_code_is_rejected() {
        let outcome = classify_failure(&ApiError::Status {
            status: 409,
            code: Some("SESSION_CLOSED".to_string()),
            message: Some("Check-in window closed".to_string()),
        });
        assert_eq!(
            outcome,
            ScanOutcome::Rejected {
                reason: RejectReason::ServerRejected { status: 409 },
                message: "Check-in window closed".to_string(),
            }
        );
    }

    #[test]
    fn test_server_failure_without_message_is_generic() {
        let outcome = classify_failure(&ApiError::Status {
            status: 500,
            code: None,
            message: None,
        });
        assert_eq!(
            outcome.message(),
            RejectReason::ServerRejected { status: 500 }.default_message()
        );
    }

    #[test]
    fn test_transport_failures_get_network_messages() {
        assert_eq!(
            classify_failure(&ApiError::Timeout).reject_reason(),
            Some(RejectReason::Timeout)
        );
        assert_eq!(
            classify_failure(&ApiError::Network("refused".into())).reject_reason(),
            Some(RejectReason::Network)
        );
    }

    #[tokio::test]
    async fn test_success_falls_back_to_known_values_and_signals() {
        let api = Arc::new(FakeApi::new().with_receipt(ScanReceipt::default()));
        let signal = AttendanceSignal::default();
        let mut rx = signal.subscribe();
        let submitter = AttendanceSubmitter::new(api.clone(), signal);

        let outcome = submitter.submit(&payload(), &info()).await;

        match &outcome {
            ScanOutcome::Success {
                activity_id,
                activity_name,
                session_label,
                timestamp,
            } => {
                assert_eq!(activity_id, "A1");
                assert_eq!(activity_name, "Campus cleanup");
                assert_eq!(session_label, DEFAULT_SESSION_LABEL);
                assert!(timestamp.ends_with('Z'));
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(rx.try_recv().expect("signal").activity_id, "A1");
        assert_eq!(
            api.submissions(),
            vec![("A1".to_string(), "tok123".to_string())]
        );
    }

    #[tokio::test]
    async fn test_success_prefers_server_values() {
        let api = Arc::new(FakeApi::new().with_receipt(ScanReceipt {
            activity_name: Some("Blood drive".to_string()),
            session_name: Some("Morning".to_string()),
            timestamp: Some("2026-03-01T08:00:00Z".to_string()),
            ..ScanReceipt::default()
        }));
        let submitter = AttendanceSubmitter::new(api, AttendanceSignal::default());

        let outcome = submitter.submit(&payload(), &info()).await;
        assert_eq!(
            outcome,
            ScanOutcome::Success {
                activity_id: "A1".to_string(),
                activity_name: "Blood drive".to_string(),
                session_label: "Morning".to_string(),
                timestamp: "2026-03-01T08:00:00.000Z".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_signal() {
        let api = Arc::new(FakeApi::new().with_submit_error(ApiError::Timeout));
        let signal = AttendanceSignal::default();
        let mut rx = signal.subscribe();
        let submitter = AttendanceSubmitter::new(api, signal);

        let outcome = submitter.submit(&payload(), &info()).await;
        assert_eq!(outcome.reject_reason(), Some(RejectReason::Timeout));
        assert!(rx.try_recv().is_err());
    }
}
