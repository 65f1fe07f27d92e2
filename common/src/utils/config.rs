use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    // Message bus
    pub bootstrap: String,
    pub enricher_topic_in: String,
    pub topic_out: String,
    pub topic_dlq: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,

    // Store
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,

    // LLM
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,

    // Retrieval
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
    #[serde(default = "default_rerank_model")]
    pub rerank_model: String,
    #[serde(default = "default_kb_top_k")]
    pub kb_top_k: usize,
    #[serde(default = "default_kb_candidates")]
    pub kb_candidates: usize,
    #[serde(default = "default_true")]
    pub rerank_enabled: bool,
    #[serde(default = "default_true")]
    pub hybrid_search_enabled: bool,
    #[serde(default = "default_hybrid_keyword_max")]
    pub hybrid_keyword_max: usize,
    #[serde(default = "default_kb_context_char_budget")]
    pub kb_context_char_budget: usize,

    // Timeouts
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,
}

fn default_group_id() -> String {
    "support-enricher".to_owned()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_owned()
}

fn default_model() -> String {
    "gpt-4o-mini".to_owned()
}

fn default_llm_max_tokens() -> u32 {
    400
}

fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_owned()
}

fn default_embedding_dimensions() -> usize {
    384
}

fn default_rerank_model() -> String {
    "BAAI/bge-reranker-base".to_owned()
}

fn default_kb_top_k() -> usize {
    5
}

fn default_kb_candidates() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_hybrid_keyword_max() -> usize {
    20
}

fn default_kb_context_char_budget() -> usize {
    4000
}

fn default_poll_timeout_secs() -> u64 {
    1
}

fn default_flush_timeout_secs() -> u64 {
    5
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(any(test, feature = "test-utils"))]
impl AppConfig {
    /// A fully-populated configuration for tests that never reaches a real
    /// broker, store, or model endpoint.
    pub fn test_default() -> Self {
        Self {
            bootstrap: "localhost:9092".to_owned(),
            enricher_topic_in: "support.tickets.v1".to_owned(),
            topic_out: "support.tickets.enriched.v1".to_owned(),
            topic_dlq: "support.tickets.dlq".to_owned(),
            group_id: default_group_id(),
            surrealdb_address: "mem://".to_owned(),
            surrealdb_username: "root".to_owned(),
            surrealdb_password: "root".to_owned(),
            surrealdb_namespace: "test".to_owned(),
            surrealdb_database: "test".to_owned(),
            openai_api_key: "test-key".to_owned(),
            openai_base_url: default_base_url(),
            model: default_model(),
            llm_max_tokens: default_llm_max_tokens(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: 3,
            rerank_model: default_rerank_model(),
            kb_top_k: default_kb_top_k(),
            kb_candidates: default_kb_candidates(),
            rerank_enabled: false,
            hybrid_search_enabled: true,
            hybrid_keyword_max: default_hybrid_keyword_max(),
            kb_context_char_budget: default_kb_context_char_budget(),
            poll_timeout_secs: default_poll_timeout_secs(),
            flush_timeout_secs: default_flush_timeout_secs(),
        }
    }
}
