//! Normalization of raw Zoho Creator records into [`SourceRecord`]s.
//!
//! Zoho returns every field as loosely typed JSON: datetimes come in several textual
//! formats, and file upload fields are plain URL strings, objects or lists of either.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDateTime, Utc};
use picsync_core::models::{ImageField, SourceRecord, UNKNOWN_RECORD_ID};
use serde_json::{Map, Value};
use url::Url;

/// Fields Zoho adds to every record; never treated as image fields.
const SYSTEM_FIELDS: &[&str] = &[
    "ID",
    "Added_Time",
    "Modified_Time",
    "Added_User",
    "Modified_User",
];

/// Substrings that mark a string value as a downloadable file URL.
const IMAGE_URL_PATTERNS: &[&str] = &["previewengine", "/download", "zoho.com/image", "zoho.com/file"];

/// Datetime formats seen in Zoho payloads, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%d-%b-%Y %H:%M:%S", // 16-Dec-2025 17:08:38
    "%B %d %Y %H:%M:%S", // December 16 2025 17:08:38
    "%Y-%m-%dT%H:%M:%S", // 2025-12-16T17:08:38
    "%d-%m-%Y %H:%M:%S", // 16-12-2025 17:08:38
    "%Y-%m-%d %H:%M:%S", // 2025-12-16 17:08:38
];

/// Parses a Zoho datetime, interpreted as UTC.
///
/// Unparsable values yield `None` and a warning.
pub fn parse_zoho_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let parsed = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc());
    if parsed.is_none() {
        tracing::warn!(value, "Could not parse Zoho datetime");
    }
    parsed
}

/// Converts a raw record object into a [`SourceRecord`].
///
/// Records without an `ID` are kept with the id [`UNKNOWN_RECORD_ID`] so that page
/// offsets stay aligned with the source. Their images are reported as record errors.
pub fn normalize_record(fields: Map<String, Value>) -> SourceRecord {
    let id = match fields.get("ID") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => UNKNOWN_RECORD_ID.to_string(),
    };
    let datetime = |name: &str| {
        fields
            .get(name)
            .and_then(Value::as_str)
            .and_then(parse_zoho_datetime)
    };
    let created_at = datetime("Added_Time");
    let modified_at = datetime("Modified_Time");
    let images = extract_image_fields(&id, &fields);

    SourceRecord {
        id,
        created_at,
        modified_at,
        images,
        fields,
    }
}

/// Finds the file upload fields of a record, in field order.
pub fn extract_image_fields(record_id: &str, fields: &Map<String, Value>) -> Vec<ImageField> {
    let mut images = Vec::new();

    for (name, value) in fields {
        if SYSTEM_FIELDS.contains(&name.as_str()) {
            continue;
        }
        match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let field_name = format!("{}_{}", name, i);
                    images.extend(image_from_value(record_id, &field_name, item));
                }
            }
            other => {
                if let Some(image) = image_from_value(record_id, name, other) {
                    images.push(image);
                }
            }
        }
    }

    images
}

fn image_from_value(record_id: &str, field_name: &str, value: &Value) -> Option<ImageField> {
    let fallback = || format!("{}_{}", record_id, field_name);

    match value {
        Value::String(url) if is_image_url(url) => Some(ImageField {
            field_name: field_name.to_string(),
            download_url: url.clone(),
            filename: filename_from_url(url).unwrap_or_else(fallback),
        }),
        Value::Object(obj) => {
            let url = ["download_url", "filepath", "url", "file"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .filter(|s| !s.is_empty())?;
            let filename = ["filename", "display_value"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(fallback);
            Some(ImageField {
                field_name: field_name.to_string(),
                download_url: url.to_string(),
                filename,
            })
        }
        _ => None,
    }
}

fn is_image_url(value: &str) -> bool {
    let lower = value.to_lowercase();
    IMAGE_URL_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Original filename of a Zoho file URL.
///
/// Preview URLs carry it as `filepath` inside the base64 JSON `cli-msg` query
/// parameter; otherwise the last path segment is used when it has an extension.
fn filename_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;

    let from_cli_msg = url
        .query_pairs()
        .find(|(k, _)| k == "cli-msg")
        // form decoding turns '+' into ' '
        .and_then(|(_, v)| STANDARD.decode(v.replace(' ', "+")).ok())
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .and_then(|msg| msg.get("filepath").and_then(Value::as_str).map(str::to_string))
        .filter(|s| !s.is_empty());
    if from_cli_msg.is_some() {
        return from_cli_msg;
    }

    url.path_segments()?
        .next_back()
        .filter(|seg| seg.contains('.') && !seg.ends_with('.'))
        .map(str::to_string)
}
