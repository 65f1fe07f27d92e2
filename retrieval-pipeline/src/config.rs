use common::utils::config::AppConfig;

/// Tunable parameters for one retrieval run.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Size of the merged candidate pool handed to the reranker.
    pub kb_candidates: usize,
    /// Number of chunks ultimately presented to the LLM.
    pub kb_top_k: usize,
    pub hybrid_search_enabled: bool,
    /// Cap on keyword entries admitted into the merged pool.
    pub hybrid_keyword_max: usize,
    pub rerank_enabled: bool,
}

impl RetrievalConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            kb_candidates: config.kb_candidates,
            kb_top_k: config.kb_top_k,
            hybrid_search_enabled: config.hybrid_search_enabled,
            hybrid_keyword_max: config.hybrid_keyword_max,
            rerank_enabled: config.rerank_enabled,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            kb_candidates: 20,
            kb_top_k: 5,
            hybrid_search_enabled: true,
            hybrid_keyword_max: 20,
            rerank_enabled: true,
        }
    }
}
