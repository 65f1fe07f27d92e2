use common::{
    error::AppError,
    events::{Citation, Enrichment, TicketEvent},
};
use retrieval_pipeline::RetrievedChunk;
use tracing::debug;

use super::{analysis::LlmAnalysis, config::EnrichmentConfig, services::PipelineServices};

/// Mutable state threaded through the per-message stages.
pub struct PipelineContext<'a> {
    pub services: &'a dyn PipelineServices,
    pub config: &'a EnrichmentConfig,
    pub ticket: Option<TicketEvent>,
    pub chunks: Vec<RetrievedChunk>,
    pub kb_context: Option<String>,
    pub analysis: Option<LlmAnalysis>,
    pub enrichment: Option<Enrichment>,
    pub citations: Vec<Citation>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(services: &'a dyn PipelineServices, config: &'a EnrichmentConfig) -> Self {
        Self {
            services,
            config,
            ticket: None,
            chunks: Vec::new(),
            kb_context: None,
            analysis: None,
            enrichment: None,
            citations: Vec::new(),
        }
    }

    pub fn ticket(&self) -> Result<&TicketEvent, AppError> {
        self.ticket.as_ref().ok_or_else(|| {
            AppError::InternalError("ticket event missing before dependent stage".to_owned())
        })
    }

    /// Log a stage error and hand it back. The typed machine is dropped with
    /// the failing stage, so no further transition is representable.
    pub fn fail(&self, err: AppError) -> AppError {
        let event_id = self
            .ticket
            .as_ref()
            .map(|ticket| ticket.event_id.as_str())
            .unwrap_or("unknown");
        debug!(event_id, error = %err, "enrichment pipeline stage failed");
        err
    }
}
