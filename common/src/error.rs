use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Schema violation at {path}: {rule}")]
    Schema { path: String, rule: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Poison-class errors are terminal for the message itself: the payload or
    /// the model output can never become valid by redelivery. Everything else
    /// (store, bus, model transport) is environmental.
    pub fn is_poison(&self) -> bool {
        matches!(
            self,
            AppError::Decode(_)
                | AppError::Schema { .. }
                | AppError::Validation(_)
                | AppError::LLMParsing(_)
        )
    }

    /// The error string recorded on a dead-letter record. Environmental
    /// failures carry an `unexpected:` prefix so replay tooling can separate
    /// them from poison messages.
    pub fn dlq_label(&self) -> String {
        if self.is_poison() {
            self.to_string()
        } else {
            format!("unexpected: {self}")
        }
    }

    pub fn schema(path: impl Into<String>, rule: impl Into<String>) -> Self {
        AppError::Schema {
            path: path.into(),
            rule: rule.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poison_errors_keep_their_message_as_dlq_label() {
        let err = AppError::Validation("empty payload".into());
        assert!(err.is_poison());
        assert_eq!(err.dlq_label(), "Validation error: empty payload");
    }

    #[test]
    fn environmental_errors_are_labeled_unexpected() {
        let err = AppError::InternalError("connection reset".into());
        assert!(!err.is_poison());
        assert!(err.dlq_label().starts_with("unexpected: "));
    }

    #[test]
    fn schema_errors_carry_path_and_rule() {
        let err = AppError::schema("/event_id", "must be a string of at least 8 characters");
        assert_eq!(
            err.to_string(),
            "Schema violation at /event_id: must be a string of at least 8 characters"
        );
    }
}
