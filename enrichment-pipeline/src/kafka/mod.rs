pub mod dlq;

use std::time::Duration;

use common::{error::AppError, utils::config::AppConfig};
use rdkafka::{
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::KafkaError,
    message::BorrowedMessage,
    producer::{FutureProducer, FutureRecord},
    ClientConfig,
};
use tracing::info;

/// Connection and topic settings for the enricher's bus clients.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub bootstrap: String,
    pub topic_in: String,
    pub topic_out: String,
    pub topic_dlq: String,
    pub group_id: String,
    pub poll_timeout: Duration,
    pub flush_timeout: Duration,
}

impl KafkaSettings {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            bootstrap: config.bootstrap.clone(),
            topic_in: config.enricher_topic_in.clone(),
            topic_out: config.topic_out.clone(),
            topic_dlq: config.topic_dlq.clone(),
            group_id: config.group_id.clone(),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            flush_timeout: Duration::from_secs(config.flush_timeout_secs),
        }
    }
}

/// Consumer for the input topic. Offsets are committed manually and
/// synchronously, never before a message reached a terminal state.
pub struct EnricherKafkaConsumer {
    inner: StreamConsumer,
}

impl EnricherKafkaConsumer {
    pub fn new(settings: &KafkaSettings) -> Result<Self, AppError> {
        let inner: StreamConsumer = ClientConfig::new()
            .set("group.id", &settings.group_id)
            .set("bootstrap.servers", &settings.bootstrap)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()?;

        inner.subscribe(&[settings.topic_in.as_str()])?;

        info!(
            bootstrap = %settings.bootstrap,
            topic = %settings.topic_in,
            group = %settings.group_id,
            "kafka consumer initialized"
        );

        Ok(Self { inner })
    }

    pub async fn recv(&self) -> Result<BorrowedMessage<'_>, KafkaError> {
        self.inner.recv().await
    }

    /// Synchronous offset commit for a terminal message. This is the
    /// at-least-once boundary.
    pub fn commit_sync(&self, message: &BorrowedMessage<'_>) -> Result<(), AppError> {
        self.inner
            .commit_message(message, CommitMode::Sync)
            .map_err(AppError::Kafka)
    }
}

/// Producer shared by the output topic and the DLQ. Every publish waits for
/// broker acknowledgment within the configured flush timeout.
pub struct KafkaPublisher {
    producer: FutureProducer,
    flush_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(settings: &KafkaSettings) -> Result<Self, AppError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &settings.bootstrap)
            .create()?;

        Ok(Self {
            producer,
            flush_timeout: settings.flush_timeout,
        })
    }

    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), AppError> {
        let record = FutureRecord::<(), [u8]>::to(topic).payload(payload);

        self.producer
            .send(record, self.flush_timeout)
            .await
            .map_err(|(err, _)| AppError::Kafka(err))?;

        Ok(())
    }
}
