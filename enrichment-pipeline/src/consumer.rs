use std::future::Future;
use std::sync::Arc;

use common::{error::AppError, events::encode_enriched};
use rdkafka::{message::BorrowedMessage, Message};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    kafka::{
        dlq::{DlqProducer, DlqRecord},
        EnricherKafkaConsumer, KafkaPublisher, KafkaSettings,
    },
    pipeline::{EnrichmentPipeline, PipelineOutcome},
};

/// Terminal disposition of one consumed message. Offsets advance only for
/// `Published`, `DuplicateAcked`, and `DeadLettered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Enrichment committed and the event reached the output topic.
    Published,
    /// The idempotency ledger already contained the event id.
    DuplicateAcked,
    /// The message (or its processing) was poisoned; a DLQ record exists.
    DeadLettered,
    /// The DLQ write itself failed; the offset stays put for redelivery.
    Requeued,
}

/// The enricher's consumer loop: one message in flight, per-partition order
/// preserved, offsets committed synchronously after the terminal state.
pub struct EnricherConsumer {
    settings: KafkaSettings,
    consumer: EnricherKafkaConsumer,
    publisher: Arc<KafkaPublisher>,
    dlq: DlqProducer,
    pipeline: EnrichmentPipeline,
}

impl EnricherConsumer {
    pub fn new(settings: KafkaSettings, pipeline: EnrichmentPipeline) -> Result<Self, AppError> {
        let consumer = EnricherKafkaConsumer::new(&settings)?;
        let publisher = Arc::new(KafkaPublisher::new(&settings)?);
        let dlq = DlqProducer::new(Arc::clone(&publisher), settings.topic_dlq.clone());

        Ok(Self {
            settings,
            consumer,
            publisher,
            dlq,
            pipeline,
        })
    }

    /// Run until the shutdown future resolves. A message already received is
    /// always driven to a terminal state before the loop exits.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<(), AppError> {
        tokio::pin!(shutdown);

        info!(
            topic_in = %self.settings.topic_in,
            topic_out = %self.settings.topic_out,
            group = %self.settings.group_id,
            "enricher consumer loop started"
        );

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown signal received; stopping consumer loop");
                    break;
                }
                polled = tokio::time::timeout(self.settings.poll_timeout, self.consumer.recv()) => {
                    match polled {
                        // Null poll: a normal idle tick.
                        Err(_elapsed) => continue,
                        // Bus-transport error: log, do not advance the offset.
                        Ok(Err(err)) => {
                            error!(error = %err, "kafka poll error");
                            continue;
                        }
                        Ok(Ok(message)) => {
                            self.handle_message(&message).await?;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_message(
        &self,
        message: &BorrowedMessage<'_>,
    ) -> Result<MessageOutcome, AppError> {
        let payload = message.payload().unwrap_or_default();

        match self.pipeline.process_payload(payload).await {
            Ok(PipelineOutcome::Enriched(event)) => {
                let published = async {
                    let bytes = encode_enriched(&event)?;
                    self.publisher
                        .publish(&self.settings.topic_out, &bytes)
                        .await
                }
                .await;

                match published {
                    Ok(()) => {
                        self.consumer.commit_sync(message)?;
                        info!(
                            ticket_id = %event.ticket_id,
                            event_id = %event.event_id,
                            risk = event.risk,
                            "enriched event published"
                        );
                        Ok(MessageOutcome::Published)
                    }
                    // The store already committed; the ledger absorbs the
                    // redelivery if this message comes around again.
                    Err(err) => self.dead_letter(message, &err).await,
                }
            }
            Ok(PipelineOutcome::Duplicate) => {
                self.consumer.commit_sync(message)?;
                Ok(MessageOutcome::DuplicateAcked)
            }
            Err(err) => self.dead_letter(message, &err).await,
        }
    }

    /// Failure arc: DLQ record, best-effort failed-status write, then commit.
    /// A failed DLQ write leaves the offset untouched.
    async fn dead_letter(
        &self,
        message: &BorrowedMessage<'_>,
        err: &AppError,
    ) -> Result<MessageOutcome, AppError> {
        let label = err.dlq_label();
        warn!(
            error = %label,
            topic = message.topic(),
            partition = message.partition(),
            offset = message.offset(),
            "message dead-lettered"
        );

        let record = DlqRecord::new(
            message.topic(),
            message.partition(),
            message.offset(),
            label,
            message.payload(),
        );

        if let Err(dlq_err) = self.dlq.send(&record).await {
            error!(error = %dlq_err, "DLQ produce failed; offset not committed");
            return Ok(MessageOutcome::Requeued);
        }

        if let Some(ticket_id) = extract_ticket_id(message.payload().unwrap_or_default()) {
            self.pipeline.services().mark_failed(&ticket_id).await;
        }

        self.consumer.commit_sync(message)?;
        Ok(MessageOutcome::DeadLettered)
    }
}

/// Best-effort ticket id extraction from a possibly-poisoned payload, for the
/// failed-status write.
fn extract_ticket_id(payload: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    let ticket_id = value.get("ticket_id")?.as_str()?;
    if ticket_id.is_empty() {
        return None;
    }
    Some(ticket_id.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ticket_id_from_valid_payloads() {
        assert_eq!(
            extract_ticket_id(br#"{"ticket_id":"T-100"}"#),
            Some("T-100".to_owned())
        );
    }

    #[test]
    fn ignores_payloads_without_a_usable_ticket_id() {
        assert_eq!(extract_ticket_id(b"not-json"), None);
        assert_eq!(extract_ticket_id(br#"{"event_id":"evt-1"}"#), None);
        assert_eq!(extract_ticket_id(br#"{"ticket_id":42}"#), None);
        assert_eq!(extract_ticket_id(br#"{"ticket_id":""}"#), None);
        assert_eq!(extract_ticket_id(b""), None);
    }
}
