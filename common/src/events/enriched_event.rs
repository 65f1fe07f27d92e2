use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::{Category, Enrichment, Sentiment, EVENT_SCHEMA_VERSION};

/// Pointer from an enrichment back into the knowledge base chunk that
/// supported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: i64,
    pub title: String,
    pub heading_path: String,
}

/// The event published to the output topic once an enrichment committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub schema_version: u32,
    pub event_id: String,
    pub ticket_id: String,
    pub ts: String,
    pub summary: String,
    pub category: Category,
    pub sentiment: Sentiment,
    pub risk: f64,
    pub suggested_reply: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl EnrichedEvent {
    /// Assemble the outbound event from a committed enrichment. `ts` is
    /// stamped by the caller at publish time.
    pub fn from_enrichment(
        event_id: &str,
        ticket_id: &str,
        ts: String,
        enrichment: &Enrichment,
        citations: Vec<Citation>,
    ) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            event_id: event_id.to_owned(),
            ticket_id: ticket_id.to_owned(),
            ts,
            summary: enrichment.summary.clone(),
            category: enrichment.category,
            sentiment: enrichment.sentiment,
            risk: enrichment.risk,
            suggested_reply: enrichment.suggested_reply.clone(),
            citations,
        }
    }
}

pub fn encode_enriched(event: &EnrichedEvent) -> Result<Vec<u8>, AppError> {
    serde_json::to_vec(event)
        .map_err(|e| AppError::InternalError(format!("failed to encode enriched event: {e}")))
}

pub fn decode_enriched(payload: &[u8]) -> Result<EnrichedEvent, AppError> {
    let event: EnrichedEvent = serde_json::from_slice(payload)
        .map_err(|e| AppError::Decode(format!("invalid enriched event: {e}")))?;

    if event.schema_version != EVENT_SCHEMA_VERSION {
        return Err(AppError::schema(
            "/schema_version",
            format!("must equal {EVENT_SCHEMA_VERSION}"),
        ));
    }
    if !(0.0..=1.0).contains(&event.risk) {
        return Err(AppError::schema("/risk", "must be within [0, 1]"));
    }

    Ok(event)
}
