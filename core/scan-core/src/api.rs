//! HTTP collaborators: QR-info lookup and attendance submission.
//!
//! The engine only sees the `AttendanceApi` trait so tests (and hosts with
//! their own transport) can swap the reqwest client out.

use async_trait::async_trait;
use qr_scan_protocol::{Endpoint, ErrorBody, HttpMethod, QrData, ScanReceipt, ScanRequest};
use reqwest::{Client, Response, Url};
use serde_json::Value;

use crate::config::ApiConfig;
use crate::error::{ApiError, Result, ScanError};

#[async_trait]
pub trait AttendanceApi: Send + Sync {
    /// `GET activities/{id}/qr-data`
    async fn fetch_qr_info(&self, activity_id: &str) -> std::result::Result<QrData, ApiError>;

    /// `POST activities/{id}/attendance/scan` with `{ token }`.
    async fn submit_scan(
        &self,
        activity_id: &str,
        token: &str,
    ) -> std::result::Result<ScanReceipt, ApiError>;
}

/// reqwest-backed client for the check-in endpoints.
#[derive(Debug, Clone)]
pub struct HttpAttendanceApi {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpAttendanceApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim()).map_err(|err| {
            ScanError::InvalidBaseUrl {
                url: config.base_url.clone(),
                details: err.to_string(),
            }
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ScanError::InvalidBaseUrl {
                url: config.base_url.clone(),
                details: "URL cannot carry a path".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(ApiError::from)?;

        Ok(Self {
            client,
            base_url,
            auth_token: config
                .auth_token
                .clone()
                .filter(|token| !token.trim().is_empty()),
        })
    }

    /// Joins the endpoint's segments onto the base URL; the activity id is
    /// percent-encoded as one segment.
    pub fn url_for(&self, endpoint: &Endpoint<'_>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(endpoint.segments());
        }
        url
    }

    async fn send(
        &self,
        endpoint: Endpoint<'_>,
        body: Option<&ScanRequest>,
    ) -> std::result::Result<Response, ApiError> {
        let url = self.url_for(&endpoint);
        let mut request = match endpoint.method() {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(%endpoint, status = status.as_u16(), "Check-in API responded");
        if status.is_success() {
            return Ok(response);
        }

        let bytes = response.bytes().await.unwrap_or_default();
        Err(status_error(status.as_u16(), &bytes))
    }
}

/// Builds the error for a non-2xx reply from whatever body came back.
fn status_error(status: u16, body: &[u8]) -> ApiError {
    let error = ErrorBody::parse(body);
    ApiError::Status {
        status,
        code: error.error_code().map(str::to_string),
        message: error.message().map(str::to_string),
    }
}

#[async_trait]
impl AttendanceApi for HttpAttendanceApi {
    async fn fetch_qr_info(&self, activity_id: &str) -> std::result::Result<QrData, ApiError> {
        let response = self.send(Endpoint::QrData { activity_id }, None).await?;
        let body: Value = response.json().await?;
        QrData::from_body(body).map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn submit_scan(
        &self,
        activity_id: &str,
        token: &str,
    ) -> std::result::Result<ScanReceipt, ApiError> {
        let request = ScanRequest {
            token: token.to_string(),
        };
        let response = self
            .send(Endpoint::AttendanceScan { activity_id }, Some(&request))
            .await?;
        // The check-in is already recorded; an unreadable body only loses detail.
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null);
        Ok(ScanReceipt::from_body(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::classify_failure;
    use crate::types::{RejectReason, ScanOutcome};

    fn api(base: &str) -> HttpAttendanceApi {
        HttpAttendanceApi::new(&ApiConfig {
            base_url: base.to_string(),
            ..ApiConfig::default()
        })
        .expect("valid base url")
    }

    #[test]
    fn test_url_joins_base_path() {
        let api = api("http://localhost:3001/api");
        assert_eq!(
            api.url_for(&Endpoint::QrData { activity_id: "A1" }).as_str(),
            "http://localhost:3001/api/activities/A1/qr-data"
        );
    }

    #[test]
    fn test_url_tolerates_trailing_slash_and_encodes_id() {
        let api = api("https://ctxh.example.edu/api/");
        assert_eq!(
            api.url_for(&Endpoint::AttendanceScan {
                activity_id: "a/b c"
            })
            .as_str(),
            "https://ctxh.example.edu/api/activities/a%2Fb%20c/attendance/scan"
        );
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let err = HttpAttendanceApi::new(&ApiConfig {
            base_url: "not a url".to_string(),
            ..ApiConfig::default()
        })
        .expect_err("invalid");
        assert!(matches!(err, ScanError::InvalidBaseUrl { .. }));

        let err = HttpAttendanceApi::new(&ApiConfig {
            base_url: "mailto:ops@example.edu".to_string(),
            ..ApiConfig::default()
        })
        .expect_err("cannot be a base");
        assert!(matches!(err, ScanError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn test_conflict_body_becomes_already_checked_in() {
        let err = status_error(
            409,
            br#"{"success":false,"message":"Already checked in","errors":{"code":"ALREADY_CHECKED_IN"}}"#,
        );
        assert_eq!(
            err,
            ApiError::Status {
                status: 409,
                code: Some("ALREADY_CHECKED_IN".to_string()),
                message: Some("Already checked in".to_string()),
            }
        );
        assert!(matches!(
            classify_failure(&err),
            ScanOutcome::AlreadyCheckedIn { .. }
        ));
    }

    #[test]
    fn test_conflict_without_code_is_rejected() {
        let err = status_error(409, br#"{"message":"Check-in window closed"}"#);
        assert_eq!(
            classify_failure(&err).reject_reason(),
            Some(RejectReason::ServerRejected { status: 409 })
        );
    }

    #[test]
    fn test_unreadable_error_body_keeps_status() {
        let err = status_error(502, b"<html>Bad Gateway</html>");
        assert_eq!(
            err,
            ApiError::Status {
                status: 502,
                code: None,
                message: None,
            }
        );
    }

    #[test]
    fn test_blank_auth_token_is_dropped() {
        let api = HttpAttendanceApi::new(&ApiConfig {
            auth_token: Some("  ".to_string()),
            ..ApiConfig::default()
        })
        .expect("valid");
        assert!(api.auth_token.is_none());
    }
}
