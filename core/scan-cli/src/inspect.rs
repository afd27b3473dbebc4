//! `decode` and `marker`: read-only commands that never contact the server.

use std::path::Path;
use std::process::ExitCode;

use chrono::{SecondsFormat, TimeZone, Utc};
use scan_core::payload::normalize;
use scan_core::{
    decode_still_image, read_marker, token_preview, RqrrDecoder, ScanConfig, StorageConfig,
};
use serde_json::json;

pub fn decode(config: &ScanConfig, path: &Path, json: bool) -> Result<ExitCode, String> {
    let bytes = fs_err::read(path).map_err(|e| e.to_string())?;
    let raw = decode_still_image(&bytes, &RqrrDecoder, config.cascade.image_max_dimension)
        .map_err(|e| e.to_string())?;
    let payload = normalize(&raw);

    if json {
        let body = match &payload {
            Ok(payload) => json!({ "raw": raw, "payload": payload }),
            Err(e) => json!({ "raw": raw, "error": e.to_string() }),
        };
        println!("{}", body);
    } else {
        match &payload {
            Ok(payload) => println!(
                "activity {} token {}",
                payload.activity_id,
                token_preview(&payload.token)
            ),
            Err(e) => println!("decoded {:?} but {}", raw, e),
        }
    }

    Ok(if payload.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

pub fn marker(config: &ScanConfig, storage: &StorageConfig, json: bool) -> Result<ExitCode, String> {
    let path = config.signal.marker_path(storage);
    let at_millis = read_marker(&path)?;
    let at = at_millis
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true));

    if json {
        println!(
            "{}",
            json!({ "path": path.display().to_string(), "atMillis": at_millis, "at": at })
        );
    } else {
        match at {
            Some(at) => println!("last check-in {}", at),
            None => println!("no check-in recorded at {}", path.display()),
        }
    }
    Ok(ExitCode::SUCCESS)
}
