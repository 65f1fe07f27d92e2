use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

use super::EVENT_SCHEMA_VERSION;

/// A single raw ticket occurrence consumed from the input topic.
///
/// `event_id` is unique per occurrence; `ticket_id` is the stable business
/// key. Unknown fields are kept for forward compatibility but are never
/// copied into the outbound enriched event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketEvent {
    pub schema_version: u32,
    pub event_id: String,
    pub ticket_id: String,
    pub ts: String,
    pub subject: String,
    pub body: String,
    pub channel: String,
    pub priority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decode and schema-validate a raw payload from the input topic.
pub fn decode_ticket(payload: &[u8]) -> Result<TicketEvent, AppError> {
    if payload.is_empty() {
        return Err(AppError::Validation("empty payload".into()));
    }

    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| AppError::Decode(format!("invalid JSON: {e}")))?;

    validate_ticket_value(&value)?;

    serde_json::from_value(value)
        .map_err(|e| AppError::Decode(format!("payload did not map onto TicketEvent: {e}")))
}

const REQUIRED_STRING_FIELDS: [&str; 7] = [
    "event_id",
    "ticket_id",
    "ts",
    "subject",
    "body",
    "channel",
    "priority",
];

fn validate_ticket_value(value: &Value) -> Result<(), AppError> {
    let object = value
        .as_object()
        .ok_or_else(|| AppError::schema("/", "must be a JSON object"))?;

    match object.get("schema_version") {
        None => return Err(AppError::schema("/schema_version", "required property missing")),
        Some(version) => {
            if version.as_u64() != Some(u64::from(EVENT_SCHEMA_VERSION)) {
                return Err(AppError::schema(
                    "/schema_version",
                    format!("must equal {EVENT_SCHEMA_VERSION}"),
                ));
            }
        }
    }

    for field in REQUIRED_STRING_FIELDS {
        let path = format!("/{field}");
        match object.get(field) {
            None => return Err(AppError::schema(path, "required property missing")),
            Some(entry) => {
                if !entry.is_string() {
                    return Err(AppError::schema(path, "must be a string"));
                }
            }
        }
    }

    let event_id = object
        .get("event_id")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if event_id.chars().count() < 8 {
        return Err(AppError::schema(
            "/event_id",
            "must be a string of at least 8 characters",
        ));
    }

    let ticket_id = object
        .get("ticket_id")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if ticket_id.is_empty() {
        return Err(AppError::schema(
            "/ticket_id",
            "must be a non-empty string",
        ));
    }

    if let Some(customer_id) = object.get("customer_id") {
        if !customer_id.is_string() {
            return Err(AppError::schema("/customer_id", "must be a string"));
        }
    }

    Ok(())
}
