mod analysis;
mod config;
mod context;
mod services;
mod stages;
mod state;

pub use analysis::LlmAnalysis;
pub use config::EnrichmentConfig;
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, PipelineServices};

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{error::AppError, events::EnrichedEvent};
use tracing::info;

use crate::utils::now_iso;

use self::{context::PipelineContext, state::received};

/// Terminal result of one pipeline run for one message. Failure arcs are the
/// `Err` side of `process_payload`; the consumer loop owns DLQ routing.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The enrichment committed; the event is ready to publish.
    Enriched(EnrichedEvent),
    /// The event id was already in the ledger; nothing was written.
    Duplicate,
}

#[allow(clippy::module_name_repetitions)]
pub struct EnrichmentPipeline {
    config: EnrichmentConfig,
    services: Arc<dyn PipelineServices>,
}

impl EnrichmentPipeline {
    pub fn new(services: Arc<dyn PipelineServices>) -> Self {
        Self::with_config(services, EnrichmentConfig::default())
    }

    pub fn with_config(services: Arc<dyn PipelineServices>, config: EnrichmentConfig) -> Self {
        Self { config, services }
    }

    pub fn services(&self) -> Arc<dyn PipelineServices> {
        Arc::clone(&self.services)
    }

    /// Drive one raw payload through decode → duplicate check → retrieval →
    /// LLM → normalize → commit. Every error leaves the store untouched
    /// except for work already committed by a previous delivery.
    #[tracing::instrument(skip_all, fields(payload_bytes = payload.len()))]
    pub async fn process_payload(&self, payload: &[u8]) -> Result<PipelineOutcome, AppError> {
        let mut ctx = PipelineContext::new(self.services.as_ref(), &self.config);
        let machine = received();

        let pipeline_started = Instant::now();

        let machine = stages::decode(machine, &mut ctx, payload)
            .await
            .map_err(|err| ctx.fail(err))?;

        let stage_start = Instant::now();
        let (machine, duplicate) = stages::check_duplicate(machine, &mut ctx)
            .await
            .map_err(|err| ctx.fail(err))?;
        if duplicate {
            info!(
                event_id = %ctx.ticket()?.event_id,
                "duplicate event dropped"
            );
            return Ok(PipelineOutcome::Duplicate);
        }
        let duplicate_check_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = stages::retrieve(machine, &mut ctx)
            .await
            .map_err(|err| ctx.fail(err))?;
        let retrieve_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = stages::call_llm(machine, &mut ctx)
            .await
            .map_err(|err| ctx.fail(err))?;
        let llm_duration = stage_start.elapsed();

        let machine = stages::normalize(machine, &mut ctx)
            .await
            .map_err(|err| ctx.fail(err))?;

        let stage_start = Instant::now();
        let _machine = stages::commit(machine, &mut ctx)
            .await
            .map_err(|err| ctx.fail(err))?;
        let commit_duration = stage_start.elapsed();

        let (event_id, ticket_id) = {
            let ticket = ctx.ticket()?;
            (ticket.event_id.clone(), ticket.ticket_id.clone())
        };
        let enrichment = ctx.enrichment.take().ok_or_else(|| {
            AppError::InternalError("enrichment missing after commit".to_owned())
        })?;

        let event = EnrichedEvent::from_enrichment(
            &event_id,
            &ticket_id,
            now_iso(),
            &enrichment,
            std::mem::take(&mut ctx.citations),
        );

        info!(
            event_id = %event.event_id,
            ticket_id = %event.ticket_id,
            total_ms = duration_millis(pipeline_started.elapsed()),
            duplicate_check_ms = duration_millis(duplicate_check_duration),
            retrieve_ms = duration_millis(retrieve_duration),
            llm_ms = duration_millis(llm_duration),
            commit_ms = duration_millis(commit_duration),
            "enrichment pipeline finished"
        );

        Ok(PipelineOutcome::Enriched(event))
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests;
