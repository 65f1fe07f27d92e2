use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    events::{Category, Citation, Enrichment, Sentiment, TicketEvent},
    storage::types::kb_chunk::KbChunk,
};
use retrieval_pipeline::RetrievedChunk;
use serde_json::json;
use tokio::sync::Mutex;

use super::{
    analysis::LlmAnalysis, EnrichmentConfig, EnrichmentPipeline, PipelineOutcome, PipelineServices,
};

struct MockServices {
    duplicate: bool,
    chunks: Vec<RetrievedChunk>,
    analysis: Result<LlmAnalysis, String>,
    calls: Mutex<Vec<&'static str>>,
    commits: Mutex<Vec<(String, Enrichment, Vec<Citation>)>>,
    failed: Mutex<Vec<String>>,
    captured_context: Mutex<Option<String>>,
}

impl MockServices {
    fn new() -> Self {
        let chunk = RetrievedChunk {
            chunk: KbChunk::new(
                12,
                1,
                0,
                Some("Payments".into()),
                "Refunds in 14 days".into(),
                None,
            ),
            title: Some("Billing FAQ".into()),
            score: 0.9,
        };

        Self {
            duplicate: false,
            chunks: vec![chunk],
            analysis: Ok(LlmAnalysis {
                summary: "Payment issue".into(),
                category: "Billing & Subscriptions".into(),
                sentiment: "frustrated".into(),
                risk: json!(1.5),
                suggested_reply: "Sorry…".into(),
            }),
            calls: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            failed: Mutex::new(Vec::new()),
            captured_context: Mutex::new(None),
        }
    }

    async fn record(&self, stage: &'static str) {
        self.calls.lock().await.push(stage);
    }
}

#[async_trait]
impl PipelineServices for MockServices {
    async fn was_processed(&self, _event_id: &str) -> Result<bool, AppError> {
        self.record("was_processed").await;
        Ok(self.duplicate)
    }

    async fn retrieve_context(&self, _query: &str) -> Result<Vec<RetrievedChunk>, AppError> {
        self.record("retrieve").await;
        Ok(self.chunks.clone())
    }

    async fn run_enrichment(
        &self,
        _ticket: &TicketEvent,
        kb_context: Option<&str>,
    ) -> Result<LlmAnalysis, AppError> {
        self.record("llm").await;
        *self.captured_context.lock().await = kb_context.map(str::to_owned);
        match &self.analysis {
            Ok(analysis) => Ok(analysis.clone()),
            Err(message) => Err(AppError::LLMParsing(message.clone())),
        }
    }

    async fn commit(
        &self,
        ticket: &TicketEvent,
        enrichment: &Enrichment,
        citations: &[Citation],
    ) -> Result<(), AppError> {
        self.record("commit").await;
        self.commits.lock().await.push((
            ticket.ticket_id.clone(),
            enrichment.clone(),
            citations.to_vec(),
        ));
        Ok(())
    }

    async fn mark_failed(&self, ticket_id: &str) {
        self.failed.lock().await.push(ticket_id.to_owned());
    }
}

fn sample_payload() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "schema_version": 1,
        "event_id": "evt-12345678",
        "ticket_id": "T-1",
        "ts": "2026-01-28T00:00:00Z",
        "subject": "Payment failed",
        "body": "Error 5001",
        "channel": "email",
        "priority": "high",
    }))
    .expect("encode payload")
}

fn pipeline_with(services: Arc<MockServices>) -> EnrichmentPipeline {
    EnrichmentPipeline::with_config(services, EnrichmentConfig::default())
}

#[tokio::test]
async fn happy_path_runs_stages_in_order_and_normalizes() {
    let services = Arc::new(MockServices::new());
    let pipeline = pipeline_with(Arc::clone(&services));

    let outcome = pipeline
        .process_payload(&sample_payload())
        .await
        .expect("pipeline run");

    let event = match outcome {
        PipelineOutcome::Enriched(event) => event,
        other => panic!("expected enriched outcome, got {other:?}"),
    };

    assert_eq!(event.schema_version, 1);
    assert_eq!(event.event_id, "evt-12345678");
    assert_eq!(event.ticket_id, "T-1");
    assert_eq!(event.category, Category::Billing);
    assert_eq!(event.sentiment, Sentiment::Negative);
    assert_eq!(event.risk, 1.0);
    assert_eq!(event.suggested_reply, "Sorry…");
    assert_eq!(
        event.citations,
        vec![Citation {
            chunk_id: 12,
            title: "Billing FAQ".into(),
            heading_path: "Payments".into(),
        }]
    );

    let calls = services.calls.lock().await.clone();
    assert_eq!(calls, vec!["was_processed", "retrieve", "llm", "commit"]);

    let commits = services.commits.lock().await;
    assert_eq!(commits.len(), 1);
    let (ticket_id, enrichment, citations) = &commits[0];
    assert_eq!(ticket_id, "T-1");
    assert_eq!(enrichment.risk, 1.0);
    assert_eq!(citations.len(), 1);
}

#[tokio::test]
async fn kb_context_reaches_the_llm_adapter() {
    let services = Arc::new(MockServices::new());
    let pipeline = pipeline_with(Arc::clone(&services));

    pipeline
        .process_payload(&sample_payload())
        .await
        .expect("pipeline run");

    let context = services
        .captured_context
        .lock()
        .await
        .clone()
        .expect("kb context present");
    assert_eq!(context, "Billing FAQ | Payments\nRefunds in 14 days");
}

#[tokio::test]
async fn duplicate_event_short_circuits_before_retrieval() {
    let mut services = MockServices::new();
    services.duplicate = true;
    let services = Arc::new(services);
    let pipeline = pipeline_with(Arc::clone(&services));

    let outcome = pipeline
        .process_payload(&sample_payload())
        .await
        .expect("pipeline run");

    assert_eq!(outcome, PipelineOutcome::Duplicate);

    let calls = services.calls.lock().await.clone();
    assert_eq!(calls, vec!["was_processed"]);
    assert!(services.commits.lock().await.is_empty());
}

#[tokio::test]
async fn non_json_payload_fails_as_poison_before_any_service_call() {
    let services = Arc::new(MockServices::new());
    let pipeline = pipeline_with(Arc::clone(&services));

    let err = pipeline
        .process_payload(b"not-json")
        .await
        .expect_err("must fail");

    assert!(err.is_poison());
    assert!(services.calls.lock().await.is_empty());
}

#[tokio::test]
async fn schema_violation_fails_before_side_effects() {
    let services = Arc::new(MockServices::new());
    let pipeline = pipeline_with(Arc::clone(&services));

    let payload = serde_json::to_vec(&json!({
        "schema_version": 1,
        "event_id": "evt-12345678",
        "ticket_id": "T-1",
        "ts": "2026-01-28T00:00:00Z",
        "subject": "Payment failed",
        "body": "Error 5001",
        "channel": "email",
        // priority missing
    }))
    .expect("encode payload");

    let err = pipeline
        .process_payload(&payload)
        .await
        .expect_err("must fail");

    assert!(matches!(err, AppError::Schema { .. }));
    assert!(services.commits.lock().await.is_empty());
}

#[tokio::test]
async fn llm_parse_failure_is_poison_and_skips_commit() {
    let mut services = MockServices::new();
    services.analysis = Err("Failed to parse LLM response".into());
    let services = Arc::new(services);
    let pipeline = pipeline_with(Arc::clone(&services));

    let err = pipeline
        .process_payload(&sample_payload())
        .await
        .expect_err("must fail");

    assert!(matches!(err, AppError::LLMParsing(_)));
    assert!(err.is_poison());

    let calls = services.calls.lock().await.clone();
    assert_eq!(calls, vec!["was_processed", "retrieve", "llm"]);
    assert!(services.commits.lock().await.is_empty());
}

// End-to-end against a real in-memory store: real ledger, real retrieval,
// canned LLM output.
mod store_backed {
    use super::*;
    use common::{
        storage::{
            db::SurrealDbClient,
            types::{
                enriched_ticket::{EnrichedTicket, TicketStatus},
                kb_chunk::KbChunk,
                kb_document::KbDocument,
                processed_event::ProcessedEvent,
            },
        },
        utils::embedding::EmbeddingProvider,
    };
    use retrieval_pipeline::RetrievalConfig;
    use uuid::Uuid;

    const DIM: usize = 16;

    struct StoreBackedServices {
        db: Arc<SurrealDbClient>,
        provider: EmbeddingProvider,
        retrieval: RetrievalConfig,
        analysis: LlmAnalysis,
    }

    #[async_trait]
    impl PipelineServices for StoreBackedServices {
        async fn was_processed(&self, event_id: &str) -> Result<bool, AppError> {
            ProcessedEvent::was_processed(&self.db, event_id).await
        }

        async fn retrieve_context(&self, query: &str) -> Result<Vec<RetrievedChunk>, AppError> {
            retrieval_pipeline::retrieve_chunks(&self.db, &self.provider, None, query, &self.retrieval)
                .await
        }

        async fn run_enrichment(
            &self,
            _ticket: &TicketEvent,
            _kb_context: Option<&str>,
        ) -> Result<LlmAnalysis, AppError> {
            Ok(self.analysis.clone())
        }

        async fn commit(
            &self,
            ticket: &TicketEvent,
            enrichment: &Enrichment,
            citations: &[Citation],
        ) -> Result<(), AppError> {
            EnrichedTicket::commit_enrichment(&self.db, ticket, enrichment, citations).await
        }

        async fn mark_failed(&self, ticket_id: &str) {
            EnrichedTicket::mark_failed_best_effort(&self.db, ticket_id).await;
        }
    }

    async fn setup() -> (Arc<SurrealDbClient>, Arc<StoreBackedServices>) {
        let db = Arc::new(
            SurrealDbClient::memory("enricher_e2e_ns", &Uuid::new_v4().to_string())
                .await
                .expect("Failed to start in-memory surrealdb"),
        );
        db.ensure_initialized(DIM).await.expect("initialize schema");

        let provider = EmbeddingProvider::hashed(DIM);

        KbDocument::create(
            KbDocument {
                id: 1,
                filename: "billing.md".into(),
                title: Some("Billing FAQ".into()),
                content_type: None,
                sha256: None,
                size_bytes: None,
                source: None,
                source_url: None,
                created_at: None,
            },
            &db,
        )
        .await
        .expect("store doc");

        let embedding = provider
            .embed("Refunds in 14 days")
            .await
            .expect("embed chunk");
        KbChunk::create(
            KbChunk::new(
                12,
                1,
                0,
                Some("Payments".into()),
                "Refunds in 14 days".into(),
                Some(embedding),
            ),
            &db,
        )
        .await
        .expect("store chunk");
        db.rebuild_indexes().await.expect("rebuild indexes");

        let services = Arc::new(StoreBackedServices {
            db: Arc::clone(&db),
            provider,
            retrieval: RetrievalConfig {
                kb_candidates: 20,
                kb_top_k: 5,
                hybrid_search_enabled: true,
                hybrid_keyword_max: 20,
                rerank_enabled: false,
            },
            analysis: LlmAnalysis {
                summary: "Payment issue".into(),
                category: "Billing & Subscriptions".into(),
                sentiment: "frustrated".into(),
                risk: json!(1.5),
                suggested_reply: "Sorry…".into(),
            },
        });

        (db, services)
    }

    #[tokio::test]
    async fn enrichment_commits_and_replay_is_absorbed_by_the_ledger() {
        let (db, services) = setup().await;
        let pipeline = EnrichmentPipeline::with_config(
            Arc::clone(&services) as Arc<dyn PipelineServices>,
            EnrichmentConfig::default(),
        );

        let outcome = pipeline
            .process_payload(&sample_payload())
            .await
            .expect("first run");
        let event = match outcome {
            PipelineOutcome::Enriched(event) => event,
            other => panic!("expected enriched outcome, got {other:?}"),
        };

        // Every citation points back into the retrieved set.
        assert_eq!(event.citations.len(), 1);
        assert_eq!(event.citations[0].chunk_id, 12);
        assert_eq!(event.citations[0].title, "Billing FAQ");

        let row = EnrichedTicket::get_by_ticket_id("T-1", &db)
            .await
            .expect("fetch")
            .expect("row present");
        assert_eq!(row.status, TicketStatus::Enriched);
        assert_eq!(row.risk, Some(1.0));
        assert_eq!(row.category, Some(Category::Billing));
        assert!(
            ProcessedEvent::was_processed(&db, "evt-12345678")
                .await
                .expect("ledger read"),
        );

        // Replay: same event id, no new writes, no output event.
        let replay = pipeline
            .process_payload(&sample_payload())
            .await
            .expect("replay run");
        assert_eq!(replay, PipelineOutcome::Duplicate);

        let row = EnrichedTicket::get_by_ticket_id("T-1", &db)
            .await
            .expect("fetch")
            .expect("row present");
        assert_eq!(row.last_event_id.as_deref(), Some("evt-12345678"));
        assert_eq!(row.status, TicketStatus::Enriched);
    }

    #[tokio::test]
    async fn failed_marker_is_terminal_for_the_event_not_the_ticket() {
        let (db, services) = setup().await;
        let pipeline = EnrichmentPipeline::with_config(
            Arc::clone(&services) as Arc<dyn PipelineServices>,
            EnrichmentConfig::default(),
        );

        pipeline
            .process_payload(&sample_payload())
            .await
            .expect("first run");

        // A later, malformed event for the same ticket fails and the consumer
        // marks the ticket failed.
        let broken = serde_json::to_vec(&json!({
            "schema_version": 1,
            "event_id": "evt-99999999",
            "ticket_id": "T-1",
            "ts": "2026-01-29T00:00:00Z",
            "subject": "Follow-up",
            "body": "Still broken",
            "channel": "email",
            // priority missing
        }))
        .expect("encode payload");

        let err = pipeline
            .process_payload(&broken)
            .await
            .expect_err("must fail");
        assert!(err.is_poison());
        services.mark_failed("T-1").await;

        let row = EnrichedTicket::get_by_ticket_id("T-1", &db)
            .await
            .expect("fetch")
            .expect("row present");
        assert_eq!(row.status, TicketStatus::Failed);

        // A well-formed retry event re-runs the pipeline and recovers the row.
        let retry = serde_json::to_vec(&json!({
            "schema_version": 1,
            "event_id": "evt-aaaabbbb",
            "ticket_id": "T-1",
            "ts": "2026-01-29T01:00:00Z",
            "subject": "Payment failed",
            "body": "Error 5001",
            "channel": "email",
            "priority": "high",
        }))
        .expect("encode payload");

        let outcome = pipeline
            .process_payload(&retry)
            .await
            .expect("retry run");
        assert!(matches!(outcome, PipelineOutcome::Enriched(_)));

        let row = EnrichedTicket::get_by_ticket_id("T-1", &db)
            .await
            .expect("fetch")
            .expect("row present");
        assert_eq!(row.status, TicketStatus::Enriched);
        assert_eq!(row.last_event_id.as_deref(), Some("evt-aaaabbbb"));
    }
}

#[tokio::test]
async fn empty_retrieval_produces_no_citations() {
    let mut services = MockServices::new();
    services.chunks = Vec::new();
    let services = Arc::new(services);
    let pipeline = pipeline_with(Arc::clone(&services));

    let outcome = pipeline
        .process_payload(&sample_payload())
        .await
        .expect("pipeline run");

    let event = match outcome {
        PipelineOutcome::Enriched(event) => event,
        other => panic!("expected enriched outcome, got {other:?}"),
    };

    assert!(event.citations.is_empty());
    assert!(services.captured_context.lock().await.is_none());
}
