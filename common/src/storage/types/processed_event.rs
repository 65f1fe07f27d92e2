use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, storage::db::SurrealDbClient};

use super::{deserialize_datetime, deserialize_flexible_id, serialize_datetime, StoredObject};

/// Idempotency ledger row: the record id is the `event_id`. Presence means
/// the event's side effects committed; the table only ever grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime",
        default
    )]
    pub processed_at: DateTime<Utc>,
}

impl StoredObject for ProcessedEvent {
    fn table_name() -> &'static str {
        "processed_event"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl ProcessedEvent {
    /// Record-and-test: has this event's work already committed?
    pub async fn was_processed(db: &SurrealDbClient, event_id: &str) -> Result<bool, AppError> {
        let row: Option<Self> = db.get_item(event_id).await?;
        Ok(row.is_some())
    }
}
