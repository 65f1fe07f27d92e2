use common::utils::config::AppConfig;

/// Pipeline-level knobs, separate from the per-run retrieval tuning.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Hard character budget for the KB context handed to the LLM.
    pub kb_context_char_budget: usize,
}

impl EnrichmentConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            kb_context_char_budget: config.kb_context_char_budget,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            kb_context_char_budget: 4000,
        }
    }
}
