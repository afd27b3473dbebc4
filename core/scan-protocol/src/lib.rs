//! Wire types for the check-in endpoints consumed by the scan engine.
//!
//! The platform wraps most responses in `{ success, message, data, errors }`,
//! but older deployments return the payload bare. Every type here is lenient:
//! unknown fields are ignored and ids may arrive as strings or numbers.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Error code the server attaches to a 409 when the student already has an
/// attendance record for the activity.
pub const ALREADY_CHECKED_IN: &str = "ALREADY_CHECKED_IN";

/// HTTP status used for the already-checked-in conflict.
pub const CONFLICT_STATUS: u16 = 409;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// The two endpoints the engine talks to, relative to the API base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    /// `GET activities/{id}/qr-data`
    QrData { activity_id: &'a str },
    /// `POST activities/{id}/attendance/scan`
    AttendanceScan { activity_id: &'a str },
}

impl<'a> Endpoint<'a> {
    pub fn method(&self) -> HttpMethod {
        match self {
            Endpoint::QrData { .. } => HttpMethod::Get,
            Endpoint::AttendanceScan { .. } => HttpMethod::Post,
        }
    }

    /// Path segments, unencoded. Callers push them onto a base URL so the
    /// activity id is percent-encoded as a single segment.
    pub fn segments(&self) -> Vec<&'a str> {
        match *self {
            Endpoint::QrData { activity_id } => vec!["activities", activity_id, "qr-data"],
            Endpoint::AttendanceScan { activity_id } => {
                vec!["activities", activity_id, "attendance", "scan"]
            }
        }
    }
}

impl fmt::Display for Endpoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self.method() {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        };
        write!(f, "{} /{}", method, self.segments().join("/"))
    }
}

/// Returns the `data` member of an enveloped response, or the body itself when
/// the response is bare.
pub fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(data @ Value::Object(_)) => data,
            Some(other) => {
                map.insert("data".to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

/// Response of the QR-info lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QrData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub activity_id: Option<String>,
    #[serde(default)]
    pub activity_name: Option<String>,
    #[serde(default)]
    pub qr_token: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub qr_json: Option<String>,
}

impl QrData {
    pub fn from_body(body: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(unwrap_data(body))
    }

    /// The active token: `qr_token` wins, `token` is the legacy field name.
    /// Empty strings count as absent.
    pub fn server_token(&self) -> Option<&str> {
        non_empty(self.qr_token.as_deref()).or_else(|| non_empty(self.token.as_deref()))
    }
}

/// Body of the attendance submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub token: String,
}

/// Successful check-in. Every field is optional; the engine fills gaps from
/// what it already knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReceipt {
    #[serde(default, deserialize_with = "lenient_string")]
    pub attendance_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub activity_id: Option<String>,
    #[serde(default)]
    pub activity_name: Option<String>,
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
}

impl ScanReceipt {
    /// Parses a 2xx body. Anything unrecognisable yields an empty receipt
    /// because the check-in itself already succeeded.
    pub fn from_body(body: Value) -> Self {
        serde_json::from_value(unwrap_data(body)).unwrap_or_default()
    }

    /// Timestamp normalised to RFC3339 UTC when it parses, raw otherwise.
    pub fn normalized_timestamp(&self) -> Option<String> {
        let raw = non_empty(self.timestamp.as_deref())?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => Some(
                parsed
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            Err(_) => Some(raw.to_string()),
        }
    }
}

/// Error body returned with any non-2xx status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub errors: Option<Value>,
}

impl ErrorBody {
    pub fn parse(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_default()
    }

    /// Machine-readable code: `errors.code` first, then a top-level `code`.
    pub fn error_code(&self) -> Option<&str> {
        self.errors
            .as_ref()
            .and_then(|errors| errors.get("code"))
            .and_then(Value::as_str)
            .or(self.code.as_deref())
            .and_then(|code| non_empty(Some(code)))
    }

    pub fn message(&self) -> Option<&str> {
        non_empty(self.message.as_deref())
    }
}

/// A `409` carrying `ALREADY_CHECKED_IN` means the student is already on the
/// list; any other conflict is a real rejection.
pub fn is_already_checked_in(status: u16, code: Option<&str>) -> bool {
    status == CONFLICT_STATUS && code == Some(ALREADY_CHECKED_IN)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts a string, a number, or null. Ids are UUID strings on current
/// servers and integers on older ones.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}
