//! Payload normalizer: turns a decoded QR string into `{activityId, token}`.
//!
//! Printed codes sometimes pick up leading/trailing junk from the decoder or
//! from copy-paste, so parsing is two-staged: the whole string first, then the
//! span between the first `{` and the last `}`.

use serde_json::{Map, Value};

use crate::error::PayloadError;
use crate::types::DecodedPayload;

const ACTIVITY_ID_FIELD: &str = "activityId";
const TOKEN_FIELD: &str = "token";

pub fn normalize(raw: &str) -> Result<DecodedPayload, PayloadError> {
    let object = parse_object(raw)?;
    let activity_id = field(&object, ACTIVITY_ID_FIELD)?;
    let token = field(&object, TOKEN_FIELD)?;
    Ok(DecodedPayload { activity_id, token })
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, PayloadError> {
    let trimmed = raw.trim();
    let strict_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => return Ok(map),
        Ok(_) => "payload is not a JSON object".to_string(),
        Err(err) => err.to_string(),
    };

    let recovered = braced_span(trimmed).ok_or_else(|| PayloadError::NotJson(strict_err))?;
    match serde_json::from_str::<Value>(recovered) {
        Ok(Value::Object(map)) => {
            tracing::debug!(
                skipped = trimmed.len() - recovered.len(),
                "Recovered QR payload from surrounding noise"
            );
            Ok(map)
        }
        Ok(_) => Err(PayloadError::NotJson(
            "payload is not a JSON object".to_string(),
        )),
        Err(err) => Err(PayloadError::NotJson(err.to_string())),
    }
}

fn braced_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

/// Strings and numbers are accepted; empty or whitespace-only counts as missing.
fn field(object: &Map<String, Value>, name: &'static str) -> Result<String, PayloadError> {
    let value = match object.get(name) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if value.is_empty() {
        return Err(PayloadError::MissingField(name));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_clean_payload_with_extra_fields() {
        let payload =
            normalize(r#"{"activityId":"A1","token":"tok123","timestamp":1718000000}"#).unwrap();
        assert_eq!(
            payload,
            DecodedPayload {
                activity_id: "A1".to_string(),
                token: "tok123".to_string()
            }
        );
    }

    #[test]
    fn test_recovers_from_surrounding_noise() {
        let payload = normalize(r#"noise{"activityId":"X","token":"Y"}moretext"#).unwrap();
        assert_eq!(payload.activity_id, "X");
        assert_eq!(payload.token, "Y");
    }

    #[test]
    fn test_rejects_non_json() {
        assert!(matches!(normalize("not json"), Err(PayloadError::NotJson(_))));
        assert!(matches!(normalize("}{"), Err(PayloadError::NotJson(_))));
        assert!(matches!(normalize(""), Err(PayloadError::NotJson(_))));
    }

    #[test]
    fn test_rejects_non_object_json() {
        assert!(matches!(
            normalize(r#"["activityId","token"]"#),
            Err(PayloadError::NotJson(_))
        ));
    }

    #[test]
    fn test_accepts_numeric_fields() {
        let payload = normalize(r#"{"activityId":42,"token":12345}"#).unwrap();
        assert_eq!(payload.activity_id, "42");
        assert_eq!(payload.token, "12345");
    }

    #[test]
    fn test_missing_or_empty_fields() {
        assert_eq!(
            normalize(r#"{"token":"Y"}"#),
            Err(PayloadError::MissingField("activityId"))
        );
        assert_eq!(
            normalize(r#"{"activityId":"X","token":"  "}"#),
            Err(PayloadError::MissingField("token"))
        );
        assert_eq!(
            normalize(r#"{"activityId":"X","token":null}"#),
            Err(PayloadError::MissingField("token"))
        );
    }

    #[test]
    fn test_trims_field_whitespace() {
        let payload = normalize(r#"  {"activityId":" A1 ","token":" tok "}  "#).unwrap();
        assert_eq!(payload.activity_id, "A1");
        assert_eq!(payload.token, "tok");
    }
}
