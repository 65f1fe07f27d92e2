use serde::Deserialize;
use serde_json::Value;

/// Raw object parsed out of the LLM response, before any normalization.
///
/// Fields default instead of failing: the normalizer owns clamping, enum
/// recovery, and truncation. `risk` stays a raw JSON value because models
/// return numbers, numeric strings, and occasionally garbage.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LlmAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub risk: Value,
    #[serde(default)]
    pub suggested_reply: String,
}
