use std::sync::Arc;

use common::error::AppError;
use serde::{Deserialize, Serialize};

use crate::utils::now_iso;

use super::KafkaPublisher;

/// Record published to the dead-letter topic for a message whose processing
/// failed in a classified way. Carries enough provenance to replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqRecord {
    pub failed_topic: String,
    pub partition: i32,
    pub offset: i64,
    pub error: String,
    pub payload: Option<String>,
    pub ts: String,
}

impl DlqRecord {
    pub fn new(
        failed_topic: &str,
        partition: i32,
        offset: i64,
        error: String,
        payload: Option<&[u8]>,
    ) -> Self {
        Self {
            failed_topic: failed_topic.to_owned(),
            partition,
            offset,
            error,
            payload: payload.map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
            ts: now_iso(),
        }
    }
}

/// Dead-letter producer. The write is best-effort: the caller must leave the
/// offset uncommitted when it fails so the message gets redelivered.
pub struct DlqProducer {
    publisher: Arc<KafkaPublisher>,
    topic: String,
}

impl DlqProducer {
    pub fn new(publisher: Arc<KafkaPublisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }

    pub async fn send(&self, record: &DlqRecord) -> Result<(), AppError> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| AppError::InternalError(format!("failed to encode DLQ record: {e}")))?;
        self.publisher.publish(&self.topic, &bytes).await
    }
}
