use retrieval_pipeline::RetrievedChunk;

/// Fixed system directive for the enrichment call. The model must answer with
/// bare JSON; fence-stripping in the adapter is a fallback, not an invitation.
pub static ENRICHMENT_SYSTEM_MESSAGE: &str = "\
You are a support operations assistant. \
Return ONLY valid JSON with exactly these keys: summary, category, sentiment, risk, suggested_reply. \
category must be one of: account_access, billing, security_incident, data_refresh, exports, feature_request, integration, notifications, general. \
sentiment must be one of: positive, neutral, negative. \
risk must be a number from 0 to 1. \
suggested_reply must open with a short acknowledgment, list 2-4 concrete next steps as bullet points, \
and close by asking for the next piece of information you need. Keep it under 140 words. \
Rely on the KB Context when it is provided; when it does not cover the question, ask clarifying \
questions instead of guessing.";

/// Append the KB context section when there is one.
pub fn build_system_prompt(kb_context: Option<&str>) -> String {
    match kb_context {
        Some(context) if !context.is_empty() => {
            format!("{ENRICHMENT_SYSTEM_MESSAGE}\n\nKB Context:\n{context}")
        }
        _ => ENRICHMENT_SYSTEM_MESSAGE.to_owned(),
    }
}

/// Assemble the KB context string from retrieved chunks under a hard
/// character budget.
///
/// Each chunk contributes a block `"{title} | {heading_path}\n{content}"`;
/// blocks are joined by blank lines. The block that would overflow the budget
/// is cut to the remaining characters and assembly stops. The budget is
/// never exceeded.
pub fn build_kb_context(chunks: &[RetrievedChunk], char_budget: usize) -> Option<String> {
    let mut context = String::new();
    let mut used = 0usize;

    for retrieved in chunks {
        let title = retrieved
            .title
            .as_deref()
            .filter(|title| !title.is_empty())
            .unwrap_or("Untitled");
        let heading = retrieved.chunk.heading_path.as_deref().unwrap_or("");
        let block = format!("{title} | {heading}\n{}", retrieved.chunk.content);

        let separator = if context.is_empty() { 0 } else { 2 };
        let block_len = block.chars().count();

        if used + separator + block_len > char_budget {
            let remaining = char_budget.saturating_sub(used + separator);
            if remaining > 0 {
                if separator > 0 {
                    context.push_str("\n\n");
                }
                context.extend(block.chars().take(remaining));
            }
            break;
        }

        if separator > 0 {
            context.push_str("\n\n");
        }
        context.push_str(&block);
        used += separator + block_len;
    }

    if context.is_empty() {
        None
    } else {
        Some(context)
    }
}

/// Strip a leading ```` ```json ````/```` ``` ```` fence and a trailing
/// ```` ``` ```` fence from a model response.
pub fn strip_code_fences(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}
