//! Token verifier: cross-checks a decoded token against the server's token.

use std::sync::Arc;

use crate::api::AttendanceApi;
use crate::error::VerifyError;
use crate::types::{token_preview, DecodedPayload, ServerTokenInfo, LEGACY_TOKEN_WIDTH, TOKEN_WIDTH};

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Match(ServerTokenInfo),
    Mismatch,
}

/// Compares a decoded token with the server's.
///
/// Both sides are trimmed. Codes printed before the token-format migration
/// carry 64 characters while the server now stores 32; in exactly that case
/// only the first 32 decoded characters are compared. Anything else must be
/// an exact match.
pub fn tokens_match(decoded: &str, server: &str) -> bool {
    let decoded = decoded.trim();
    let server = server.trim();
    if decoded.is_empty() || server.is_empty() {
        return false;
    }

    if decoded.chars().count() == LEGACY_TOKEN_WIDTH && server.chars().count() == TOKEN_WIDTH {
        let prefix_end = decoded
            .char_indices()
            .nth(TOKEN_WIDTH)
            .map(|(idx, _)| idx)
            .unwrap_or(decoded.len());
        return &decoded[..prefix_end] == server;
    }

    decoded == server
}

pub struct TokenVerifier {
    api: Arc<dyn AttendanceApi>,
}

impl TokenVerifier {
    pub fn new(api: Arc<dyn AttendanceApi>) -> Self {
        Self { api }
    }

    /// Fetches the activity's current token (never cached) and compares.
    pub async fn verify(&self, payload: &DecodedPayload) -> Result<Verification, VerifyError> {
        let info = self.api.fetch_qr_info(&payload.activity_id).await?;

        let Some(server_token) = info.server_token() else {
            tracing::info!(
                activity_id = %payload.activity_id,
                "Activity has no active QR token"
            );
            return Err(VerifyError::ActivityHasNoToken);
        };

        if !tokens_match(&payload.token, server_token) {
            tracing::info!(
                activity_id = %payload.activity_id,
                decoded = %token_preview(payload.token.trim()),
                server = %token_preview(server_token),
                "QR token mismatch"
            );
            return Ok(Verification::Mismatch);
        }

        tracing::debug!(activity_id = %payload.activity_id, "QR token verified");
        Ok(Verification::Match(ServerTokenInfo {
            token: server_token.to_string(),
            activity_name: info.activity_name.unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::testing::FakeApi;
    use qr_scan_protocol::QrData;

    fn payload(token: &str) -> DecodedPayload {
        DecodedPayload {
            activity_id: "A1".to_string(),
            token: token.to_string(),
        }
    }

    #[test]
    fn test_legacy_64_char_token_matches_32_char_server_token() {
        assert!(tokens_match(&"a".repeat(64), &"a".repeat(32)));
    }

    #[test]
    fn test_different_tokens_mismatch() {
        assert!(!tokens_match(&"b".repeat(32), &"a".repeat(32)));
    }

    #[test]
    fn test_truncation_only_applies_to_64_vs_32() {
        assert!(!tokens_match(&"a".repeat(63), &"a".repeat(32)));
        assert!(!tokens_match(&"a".repeat(32), &"a".repeat(64)));
        assert!(!tokens_match(&"a".repeat(48), &"a".repeat(24)));
        let mut legacy = "a".repeat(32);
        legacy.push_str(&"z".repeat(32));
        assert!(tokens_match(&legacy, &"a".repeat(32)));
    }

    #[test]
    fn test_trims_and_never_partially_matches() {
        assert!(tokens_match("  tok123\n", "tok123 "));
        assert!(!tokens_match("tok12", "tok123"));
        assert!(!tokens_match("", ""));
    }

    #[tokio::test]
    async fn test_verify_match_carries_activity_name() {
        let api = Arc::new(FakeApi::new().with_qr_data(QrData {
            activity_name: Some("Campus cleanup".to_string()),
            qr_token: Some("tok123".to_string()),
            ..QrData::default()
        }));
        let verifier = TokenVerifier::new(api.clone());

        let verification = verifier.verify(&payload("tok123")).await.unwrap();
        assert_eq!(
            verification,
            Verification::Match(ServerTokenInfo {
                token: "tok123".to_string(),
                activity_name: "Campus cleanup".to_string(),
            })
        );
        assert_eq!(api.lookups(), vec!["A1".to_string()]);
    }

    #[tokio::test]
    async fn test_verify_falls_back_to_legacy_token_field() {
        let api = Arc::new(FakeApi::new().with_qr_data(QrData {
            qr_token: Some(String::new()),
            token: Some("tok123".to_string()),
            ..QrData::default()
        }));
        let verification = TokenVerifier::new(api).verify(&payload("tok123")).await;
        assert!(matches!(verification, Ok(Verification::Match(_))));
    }

    #[tokio::test]
    async fn test_verify_without_server_token() {
        let api = Arc::new(FakeApi::new().with_qr_data(QrData::default()));
        let verification = TokenVerifier::new(api).verify(&payload("tok123")).await;
        assert_eq!(verification, Err(VerifyError::ActivityHasNoToken));
    }

    #[tokio::test]
    async fn test_verify_mismatch() {
        let api = Arc::new(FakeApi::new().with_qr_data(QrData {
            qr_token: Some("a".repeat(32)),
            ..QrData::default()
        }));
        let verification = TokenVerifier::new(api)
            .verify(&payload(&"b".repeat(32)))
            .await;
        assert_eq!(verification, Ok(Verification::Mismatch));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_distinct() {
        let api = Arc::new(FakeApi::new().with_lookup_error(ApiError::Status {
            status: 404,
            code: None,
            message: Some("Activity has no QR code".to_string()),
        }));
        let err = TokenVerifier::new(api)
            .verify(&payload("tok123"))
            .await
            .unwrap_err();
        match err {
            VerifyError::Lookup(api_err) => {
                assert_eq!(api_err.server_message(), Some("Activity has no QR code"))
            }
            other => panic!("expected lookup error, got {other:?}"),
        }
    }
}
