use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::warn;

use crate::{
    error::AppError,
    events::{Category, Citation, Enrichment, Sentiment, TicketEvent},
    storage::db::SurrealDbClient,
    stored_object,
};

/// Lifecycle of a ticket row. `Failed` is terminal for the event that caused
/// it, not for the ticket; a later event re-runs the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Enriched,
    Failed,
}

stored_object!(EnrichedTicket, "enriched_ticket", {
    last_event_id: Option<String>,
    subject: Option<String>,
    body: Option<String>,
    channel: Option<String>,
    priority: Option<String>,
    customer_id: Option<String>,
    status: TicketStatus,
    summary: Option<String>,
    category: Option<Category>,
    sentiment: Option<Sentiment>,
    risk: Option<f64>,
    suggested_reply: Option<String>,
    citations: Option<Vec<Citation>>
});

const UPSERT_TICKET: &str = "
    UPSERT type::thing('enriched_ticket', $ticket_id) SET
        last_event_id = $event_id,
        subject = $subject,
        body = $body,
        channel = $channel,
        priority = $priority,
        customer_id = $customer_id,
        status = 'enriched',
        summary = $summary,
        category = $category,
        sentiment = $sentiment,
        risk = $risk,
        suggested_reply = $suggested_reply,
        citations = $citations,
        created_at = IF created_at != NONE THEN created_at ELSE time::now() END,
        updated_at = time::now();
";

const UPSERT_LEDGER: &str = "
    UPSERT type::thing('processed_event', $event_id) SET
        processed_at = IF processed_at != NONE THEN processed_at ELSE time::now() END;
";

impl EnrichedTicket {
    pub async fn get_by_ticket_id(
        ticket_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        db.get_item(ticket_id).await.map_err(AppError::Database)
    }

    /// Commit an enrichment and its idempotency marker atomically.
    ///
    /// Both upserts run inside a single transaction so a ticket row can never
    /// commit without its ledger entry. Transient commit conflicts are
    /// retried with backoff; every other error rolls back and propagates.
    pub async fn commit_enrichment(
        db: &SurrealDbClient,
        ticket: &TicketEvent,
        enrichment: &Enrichment,
        citations: &[Citation],
    ) -> Result<(), AppError> {
        let retry_strategy = ExponentialBackoff::from_millis(50).map(jitter).take(3);

        RetryIf::spawn(
            retry_strategy,
            || Self::run_commit(db, ticket, enrichment, citations),
            is_retryable_conflict,
        )
        .await
    }

    async fn run_commit(
        db: &SurrealDbClient,
        ticket: &TicketEvent,
        enrichment: &Enrichment,
        citations: &[Citation],
    ) -> Result<(), AppError> {
        let response = db
            .client
            .query("BEGIN TRANSACTION;")
            .query(UPSERT_TICKET)
            .query(UPSERT_LEDGER)
            .query("COMMIT TRANSACTION;")
            .bind(("ticket_id", ticket.ticket_id.clone()))
            .bind(("event_id", ticket.event_id.clone()))
            .bind(("subject", ticket.subject.clone()))
            .bind(("body", ticket.body.clone()))
            .bind(("channel", ticket.channel.clone()))
            .bind(("priority", ticket.priority.clone()))
            .bind(("customer_id", ticket.customer_id.clone()))
            .bind(("summary", enrichment.summary.clone()))
            .bind(("category", enrichment.category))
            .bind(("sentiment", enrichment.sentiment))
            .bind(("risk", enrichment.risk))
            .bind(("suggested_reply", enrichment.suggested_reply.clone()))
            .bind(("citations", citations.to_vec()))
            .await
            .map_err(AppError::Database)?;

        response.check().map_err(AppError::Database)?;

        Ok(())
    }

    /// Best-effort failure marker: set the ticket's status to `failed` when a
    /// ticket id could be extracted from a poisoned message. Runs in its own
    /// implicit transaction and swallows every error.
    pub async fn mark_failed_best_effort(db: &SurrealDbClient, ticket_id: &str) {
        let result = db
            .client
            .query(
                "UPDATE type::thing('enriched_ticket', $ticket_id) SET \
                 status = 'failed', updated_at = time::now();",
            )
            .bind(("ticket_id", ticket_id.to_owned()))
            .await;

        match result {
            Ok(response) => {
                if let Err(err) = response.check() {
                    warn!(ticket_id, error = %err, "failed-status write rejected");
                }
            }
            Err(err) => {
                warn!(ticket_id, error = %err, "failed-status write did not reach the store");
            }
        }
    }
}

fn is_retryable_conflict(error: &AppError) -> bool {
    matches!(
        error,
        AppError::Database(inner)
            if inner.to_string().contains("read or write conflict")
    )
}
