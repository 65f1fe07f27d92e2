use common::{error::AppError, events::decode_ticket};
use state_machines::core::GuardError;
use tracing::{debug, info, instrument};

use crate::{
    normalize::{build_citations, normalize_analysis},
    utils::llm_instructions::build_kb_context,
};

use super::{
    context::PipelineContext,
    state::{
        Decoded, DuplicateChecked, EnrichmentMachine, LlmCalled, Normalized, Received, Retrieved,
    },
};

#[instrument(level = "trace", skip_all)]
pub async fn decode(
    machine: EnrichmentMachine<(), Received>,
    ctx: &mut PipelineContext<'_>,
    payload: &[u8],
) -> Result<EnrichmentMachine<(), Decoded>, AppError> {
    let ticket = decode_ticket(payload)?;

    info!(
        event_id = %ticket.event_id,
        ticket_id = %ticket.ticket_id,
        channel = %ticket.channel,
        priority = %ticket.priority,
        "ticket event decoded"
    );

    ctx.ticket = Some(ticket);

    machine
        .decode()
        .map_err(|(_, guard)| map_guard_error("decode", &guard))
}

/// Consult the idempotency ledger. The boolean rides alongside the machine so
/// the driver can short-circuit duplicates without an extra state.
#[instrument(level = "trace", skip_all)]
pub async fn check_duplicate(
    machine: EnrichmentMachine<(), Decoded>,
    ctx: &mut PipelineContext<'_>,
) -> Result<(EnrichmentMachine<(), DuplicateChecked>, bool), AppError> {
    let ticket = ctx.ticket()?;
    let duplicate = ctx.services.was_processed(&ticket.event_id).await?;

    if duplicate {
        debug!(event_id = %ticket.event_id, "event already processed");
    }

    let machine = machine
        .check_duplicate()
        .map_err(|(_, guard)| map_guard_error("check_duplicate", &guard))?;

    Ok((machine, duplicate))
}

#[instrument(level = "trace", skip_all)]
pub async fn retrieve(
    machine: EnrichmentMachine<(), DuplicateChecked>,
    ctx: &mut PipelineContext<'_>,
) -> Result<EnrichmentMachine<(), Retrieved>, AppError> {
    let ticket = ctx.ticket()?;
    let query = format!("{}\n\n{}", ticket.subject, ticket.body);

    let chunks = ctx.services.retrieve_context(query.trim()).await?;

    debug!(
        event_id = %ticket.event_id,
        chunk_count = chunks.len(),
        "kb retrieval completed"
    );

    ctx.chunks = chunks;

    machine
        .retrieve()
        .map_err(|(_, guard)| map_guard_error("retrieve", &guard))
}

#[instrument(level = "trace", skip_all)]
pub async fn call_llm(
    machine: EnrichmentMachine<(), Retrieved>,
    ctx: &mut PipelineContext<'_>,
) -> Result<EnrichmentMachine<(), LlmCalled>, AppError> {
    let kb_context = build_kb_context(&ctx.chunks, ctx.config.kb_context_char_budget);
    let ticket = ctx.ticket()?;

    let analysis = ctx
        .services
        .run_enrichment(ticket, kb_context.as_deref())
        .await?;

    debug!(
        event_id = %ticket.event_id,
        context_chars = kb_context.as_ref().map_or(0, |c| c.chars().count()),
        "llm analysis received"
    );

    ctx.kb_context = kb_context;
    ctx.analysis = Some(analysis);

    machine
        .call_llm()
        .map_err(|(_, guard)| map_guard_error("call_llm", &guard))
}

#[instrument(level = "trace", skip_all)]
pub async fn normalize(
    machine: EnrichmentMachine<(), LlmCalled>,
    ctx: &mut PipelineContext<'_>,
) -> Result<EnrichmentMachine<(), Normalized>, AppError> {
    let analysis = ctx.analysis.as_ref().ok_or_else(|| {
        AppError::InternalError("llm analysis missing before normalization".to_owned())
    })?;

    let enrichment = normalize_analysis(analysis);

    // The normalizer clamps risk; out of range here means a logic bug.
    if !(0.0..=1.0).contains(&enrichment.risk) {
        return Err(AppError::Validation(format!(
            "risk out of range: {}",
            enrichment.risk
        )));
    }

    ctx.citations = build_citations(&ctx.chunks);
    ctx.enrichment = Some(enrichment);

    machine
        .normalize()
        .map_err(|(_, guard)| map_guard_error("normalize", &guard))
}

#[instrument(level = "trace", skip_all)]
pub async fn commit(
    machine: EnrichmentMachine<(), Normalized>,
    ctx: &mut PipelineContext<'_>,
) -> Result<EnrichmentMachine<(), super::state::Committed>, AppError> {
    let ticket = ctx.ticket()?;
    let enrichment = ctx.enrichment.as_ref().ok_or_else(|| {
        AppError::InternalError("enrichment missing before commit".to_owned())
    })?;

    ctx.services
        .commit(ticket, enrichment, &ctx.citations)
        .await?;

    info!(
        event_id = %ticket.event_id,
        ticket_id = %ticket.ticket_id,
        risk = enrichment.risk,
        category = %enrichment.category,
        "enrichment committed"
    );

    machine
        .commit()
        .map_err(|(_, guard)| map_guard_error("commit", &guard))
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid enrichment pipeline transition during {event}: {guard:?}"
    ))
}
