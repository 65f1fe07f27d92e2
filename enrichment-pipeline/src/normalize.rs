use common::events::{Category, Citation, Enrichment, Sentiment};
use retrieval_pipeline::RetrievedChunk;
use serde_json::Value;

use crate::pipeline::LlmAnalysis;

const REPLY_WORD_CAP: usize = 140;

/// First-match keyword table for category recovery. Order matters: the first
/// group containing a matching keyword wins.
const CATEGORY_KEYWORDS: &[(&[&str], Category)] = &[
    (&["billing", "invoice", "refund", "charge"], Category::Billing),
    (&["security", "breach", "incident"], Category::SecurityIncident),
    (&["refresh"], Category::DataRefresh),
    (&["export"], Category::Exports),
    (&["feature", "roadmap"], Category::FeatureRequest),
    (&["oauth", "api key", "integration"], Category::Integration),
    (&["alert", "notification", "slack"], Category::Notifications),
    (&["login", "password", "account", "access"], Category::AccountAccess),
];

/// Clamp and normalize a raw LLM analysis into the closed enrichment shape.
pub fn normalize_analysis(analysis: &LlmAnalysis) -> Enrichment {
    Enrichment {
        summary: analysis.summary.clone(),
        category: normalize_category(&analysis.category),
        sentiment: normalize_sentiment(&analysis.sentiment),
        risk: normalize_risk(&analysis.risk),
        suggested_reply: truncate_reply(&analysis.suggested_reply),
    }
}

/// Coerce to a number (numeric strings count), default non-numeric to 0.0,
/// clamp into [0, 1].
pub fn normalize_risk(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|risk| risk.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0)
}

pub fn normalize_sentiment(raw: &str) -> Sentiment {
    let value = raw.trim().to_lowercase();
    if let Some(sentiment) = Sentiment::from_label(&value) {
        return sentiment;
    }
    match value.as_str() {
        "frustrated" | "angry" | "upset" => Sentiment::Negative,
        "happy" | "satisfied" => Sentiment::Positive,
        _ => Sentiment::Neutral,
    }
}

pub fn normalize_category(raw: &str) -> Category {
    let value = raw.trim().to_lowercase();
    if let Some(category) = Category::from_label(&value) {
        return category;
    }
    for (keywords, category) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|keyword| value.contains(keyword)) {
            return *category;
        }
    }
    Category::General
}

/// Cap the reply at 140 whitespace-split words, appending an ellipsis when
/// cut. Replies within the cap keep their newline structure untouched.
pub fn truncate_reply(reply: &str) -> String {
    let words: Vec<&str> = reply.split_whitespace().collect();
    if words.len() <= REPLY_WORD_CAP {
        return reply.to_owned();
    }
    let mut truncated = words[..REPLY_WORD_CAP].join(" ");
    truncated.push('…');
    truncated
}

/// Citations for the chunks presented to the LLM. Chunks without an id are
/// dropped; missing titles default to "Untitled", missing heading paths to "".
pub fn build_citations(chunks: &[RetrievedChunk]) -> Vec<Citation> {
    chunks
        .iter()
        .filter_map(|retrieved| {
            let chunk_id = retrieved.chunk.id?;
            Some(Citation {
                chunk_id,
                title: retrieved
                    .title
                    .clone()
                    .filter(|title| !title.is_empty())
                    .unwrap_or_else(|| "Untitled".to_owned()),
                heading_path: retrieved.chunk.heading_path.clone().unwrap_or_default(),
            })
        })
        .collect()
}
