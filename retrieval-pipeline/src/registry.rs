use std::sync::Arc;

use common::{
    error::AppError,
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use tracing::info;

use crate::reranking::RerankerPool;

/// Process-scoped registry for the model handles shared across messages.
///
/// Handles are keyed by model code: swapping a code rebuilds the handle and
/// drops the previous one. The registry is built once at startup and passed
/// down; there is no ambient global state.
pub struct ModelRegistry {
    embedding: Arc<EmbeddingProvider>,
    reranker: Option<Arc<RerankerPool>>,
}

impl ModelRegistry {
    pub async fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let embedding = Arc::new(EmbeddingProvider::fastembed(&config.embedding_model).await?);

        // The stored vectors have a fixed dimensionality. A model that
        // produces anything else must never be silently accepted.
        if embedding.dimension() != config.embedding_dimensions {
            return Err(AppError::Validation(format!(
                "embedding model '{}' produces {}-dimensional vectors but the store is declared \
                 with dimension {}",
                config.embedding_model,
                embedding.dimension(),
                config.embedding_dimensions
            )));
        }

        let reranker = RerankerPool::maybe_from_config(config)?;

        info!(
            embedding_model = %config.embedding_model,
            dimension = embedding.dimension(),
            rerank_enabled = reranker.is_some(),
            "model registry initialized"
        );

        Ok(Self {
            embedding,
            reranker,
        })
    }

    /// Assemble a registry from pre-built backends (tests, tooling).
    pub fn with_backends(
        embedding: Arc<EmbeddingProvider>,
        reranker: Option<Arc<RerankerPool>>,
    ) -> Self {
        Self {
            embedding,
            reranker,
        }
    }

    pub fn embedding(&self) -> Arc<EmbeddingProvider> {
        Arc::clone(&self.embedding)
    }

    pub fn reranker(&self) -> Option<Arc<RerankerPool>> {
        self.reranker.as_ref().map(Arc::clone)
    }

    /// Replace the embedding model when the configured code changed. Loads
    /// the new FastEmbed handle, then installs it through [`Self::swap_embedding`].
    pub async fn swap_embedding_model(
        &mut self,
        model_code: &str,
        expected_dimension: usize,
    ) -> Result<(), AppError> {
        if self.embedding.model_code().as_deref() == Some(model_code) {
            return Ok(());
        }

        let next = Arc::new(EmbeddingProvider::fastembed(model_code).await?);
        self.swap_embedding(next, expected_dimension)
    }

    /// Install a replacement embedding backend, evicting the prior handle.
    /// A dimension mismatch aborts the swap and keeps the current handle.
    pub fn swap_embedding(
        &mut self,
        next: Arc<EmbeddingProvider>,
        expected_dimension: usize,
    ) -> Result<(), AppError> {
        if next.dimension() != expected_dimension {
            return Err(AppError::Validation(format!(
                "embedding backend '{}' produces {}-dimensional vectors, expected {}",
                next.model_code().as_deref().unwrap_or(next.backend_label()),
                next.dimension(),
                expected_dimension
            )));
        }

        info!(
            backend = next.backend_label(),
            dimension = next.dimension(),
            "embedding backend swapped"
        );
        self.embedding = next;
        Ok(())
    }

    /// Replace the reranker when the configured code changed, or drop it when
    /// reranking was disabled.
    pub fn swap_rerank_model(
        &mut self,
        model_code: Option<&str>,
        pool_size: usize,
    ) -> Result<(), AppError> {
        match (model_code, self.reranker.as_ref()) {
            (None, _) => {
                self.reranker = None;
                Ok(())
            }
            (Some(code), Some(pool)) if pool.model_code() == code => Ok(()),
            (Some(code), _) => {
                self.reranker = Some(RerankerPool::new(code, pool_size)?);
                info!(model_code = code, "rerank model swapped");
                Ok(())
            }
        }
    }
}
