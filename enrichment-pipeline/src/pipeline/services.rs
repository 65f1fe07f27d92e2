use std::sync::Arc;

use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use common::{
    error::AppError,
    events::{Citation, Enrichment, TicketEvent},
    storage::{
        db::SurrealDbClient,
        types::{enriched_ticket::EnrichedTicket, processed_event::ProcessedEvent},
    },
    utils::config::AppConfig,
};
use retrieval_pipeline::{ModelRegistry, RetrievalConfig, RetrievedChunk};
use serde_json::json;

use crate::utils::llm_instructions::{build_system_prompt, strip_code_fences};

use super::analysis::LlmAnalysis;

/// Seam between the pipeline stages and the outside world (store, retrieval,
/// LLM). Tests swap this for a mock that records calls.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    async fn was_processed(&self, event_id: &str) -> Result<bool, AppError>;

    async fn retrieve_context(&self, query: &str) -> Result<Vec<RetrievedChunk>, AppError>;

    async fn run_enrichment(
        &self,
        ticket: &TicketEvent,
        kb_context: Option<&str>,
    ) -> Result<LlmAnalysis, AppError>;

    async fn commit(
        &self,
        ticket: &TicketEvent,
        enrichment: &Enrichment,
        citations: &[Citation],
    ) -> Result<(), AppError>;

    async fn mark_failed(&self, ticket_id: &str);
}

pub struct DefaultPipelineServices {
    db: Arc<SurrealDbClient>,
    openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    config: AppConfig,
    retrieval_config: RetrievalConfig,
    registry: Arc<ModelRegistry>,
}

impl DefaultPipelineServices {
    pub fn new(
        db: Arc<SurrealDbClient>,
        openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        config: AppConfig,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        let retrieval_config = RetrievalConfig::from_app_config(&config);
        Self {
            db,
            openai_client,
            config,
            retrieval_config,
            registry,
        }
    }

    fn prepare_llm_request(
        &self,
        ticket: &TicketEvent,
        kb_context: Option<&str>,
    ) -> Result<CreateChatCompletionRequest, AppError> {
        let system = build_system_prompt(kb_context);

        // Only the declared subset of the ticket reaches the model.
        let user = serde_json::to_string(&json!({
            "ticket_id": ticket.ticket_id,
            "subject": ticket.subject,
            "body": ticket.body,
            "channel": ticket.channel,
            "priority": ticket.priority,
        }))
        .map_err(|e| AppError::InternalError(format!("failed to serialize ticket: {e}")))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .max_tokens(self.config.llm_max_tokens)
            .messages([
                ChatCompletionRequestSystemMessage::from(system).into(),
                ChatCompletionRequestUserMessage::from(user).into(),
            ])
            .build()?;

        Ok(request)
    }

    async fn perform_analysis(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<LlmAnalysis, AppError> {
        let response = self.openai_client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or(AppError::LLMParsing(
                "No content found in LLM response".into(),
            ))?;

        let stripped = strip_code_fences(content);

        serde_json::from_str::<LlmAnalysis>(stripped).map_err(|e| {
            AppError::LLMParsing(format!("Failed to parse LLM response into enrichment: {e}"))
        })
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn was_processed(&self, event_id: &str) -> Result<bool, AppError> {
        ProcessedEvent::was_processed(&self.db, event_id).await
    }

    async fn retrieve_context(&self, query: &str) -> Result<Vec<RetrievedChunk>, AppError> {
        let reranker_lease = match self.registry.reranker() {
            Some(pool) => Some(pool.checkout().await?),
            None => None,
        };

        retrieval_pipeline::retrieve_chunks(
            &self.db,
            &self.registry.embedding(),
            reranker_lease,
            query,
            &self.retrieval_config,
        )
        .await
    }

    async fn run_enrichment(
        &self,
        ticket: &TicketEvent,
        kb_context: Option<&str>,
    ) -> Result<LlmAnalysis, AppError> {
        let request = self.prepare_llm_request(ticket, kb_context)?;
        self.perform_analysis(request).await
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
