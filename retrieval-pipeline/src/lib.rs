pub mod config;
pub mod merge;
pub mod registry;
pub mod reranking;

use std::cmp::Ordering;
use std::collections::HashMap;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            kb_chunk::{KbChunk, KbChunkSearchResult},
            kb_document::KbDocument,
        },
    },
    utils::embedding::EmbeddingProvider,
};
use tracing::{debug, instrument};

pub use config::RetrievalConfig;
pub use registry::ModelRegistry;
use reranking::RerankerLease;

/// A KB chunk selected for a ticket, carrying the parent document's title for
/// prompts and citations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: KbChunk,
    pub title: Option<String>,
    pub score: f32,
}

impl RetrievedChunk {
    /// Text presented to the cross-encoder for this candidate.
    pub fn rerank_document(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        if let Some(title) = self.title.as_deref() {
            if !title.is_empty() {
                parts.push(title);
            }
        }
        if let Some(heading) = self.chunk.heading_path.as_deref() {
            if !heading.is_empty() {
                parts.push(heading);
            }
        }
        parts.push(&self.chunk.content);
        parts.join("\n").trim().to_owned()
    }
}

/// Two-stage hybrid retrieval: dense + keyword candidate collection, the
/// deterministic positional merge, then optional cross-encoder reranking,
/// truncated to `kb_top_k`.
#[instrument(skip_all, fields(query_chars = query.chars().count()))]
pub async fn retrieve_chunks(
    db: &SurrealDbClient,
    embedding_provider: &EmbeddingProvider,
    reranker: Option<RerankerLease>,
    query: &str,
    config: &RetrievalConfig,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let query = query.trim();

    let query_embedding = embedding_provider.embed(query).await?;

    let keyword_enabled = config.hybrid_search_enabled && !query.is_empty();
    let (dense, keyword) = tokio::try_join!(
        KbChunk::vector_search(config.kb_candidates, query_embedding, db),
        async {
            if keyword_enabled {
                KbChunk::keyword_search(config.hybrid_keyword_max, query, db).await
            } else {
                Ok(Vec::new())
            }
        },
    )?;

    debug!(
        dense = dense.len(),
        keyword = keyword.len(),
        "hybrid retrieval candidate counts"
    );

    let merged = merge::merge_candidates(
        dense,
        keyword,
        config.kb_candidates,
        config.hybrid_keyword_max,
    );
    let mut candidates = hydrate_titles(db, merged).await?;

    if config.rerank_enabled && !candidates.is_empty() {
        if let Some(lease) = reranker {
            return rerank_candidates(&lease, query, candidates, config.kb_top_k).await;
        }
        debug!("rerank enabled but no lease available; truncating merged candidates");
    }

    candidates.truncate(config.kb_top_k);
    Ok(candidates)
}

/// Attach parent-document titles to the merged candidates.
async fn hydrate_titles(
    db: &SurrealDbClient,
    candidates: Vec<KbChunkSearchResult>,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let mut doc_ids: Vec<i64> = candidates
        .iter()
        .map(|candidate| candidate.chunk.doc_id)
        .collect();
    doc_ids.sort_unstable();
    doc_ids.dedup();

    let documents = KbDocument::get_many(&doc_ids, db).await?;
    let titles: HashMap<i64, Option<String>> = documents
        .into_iter()
        .map(|doc| (doc.id, doc.title))
        .collect();

    Ok(candidates
        .into_iter()
        .map(|candidate| {
            let title = titles
                .get(&candidate.chunk.doc_id)
                .cloned()
                .unwrap_or_default();
            RetrievedChunk {
                title,
                score: candidate.score,
                chunk: candidate.chunk,
            }
        })
        .collect())
}

/// Score every (query, candidate) pair, sort descending with a stable sort so
/// equal scores keep the merge order, and keep the top `top_k`.
async fn rerank_candidates(
    lease: &RerankerLease,
    query: &str,
    candidates: Vec<RetrievedChunk>,
    top_k: usize,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let documents: Vec<String> = candidates
        .iter()
        .map(RetrievedChunk::rerank_document)
        .collect();

    let results = lease.rerank(query, documents).await?;

    let mut scores = vec![f32::MIN; candidates.len()];
    for result in results {
        if let Some(slot) = scores.get_mut(result.index) {
            *slot = result.score;
        }
    }

    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| {
        scores[*b]
            .partial_cmp(&scores[*a])
            .unwrap_or(Ordering::Equal)
    });

    let mut candidates: Vec<Option<RetrievedChunk>> = candidates.into_iter().map(Some).collect();
    let mut reranked = Vec::with_capacity(top_k.min(candidates.len()));
    for idx in order.into_iter().take(top_k) {
        if let Some(mut candidate) = candidates[idx].take() {
            candidate.score = scores[idx];
            reranked.push(candidate);
        }
    }

    Ok(reranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const DIM: usize = 16;

    async fn setup_db() -> SurrealDbClient {
        let namespace = "retrieval_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized(DIM).await.expect("initialize schema");
        db
    }

    async fn seed_chunk(db: &SurrealDbClient, provider: &EmbeddingProvider, id: i64, content: &str) {
        let embedding = provider.embed(content).await.expect("embed chunk");
        KbChunk::create(
            KbChunk::new(id, 1, id, Some("Payments".into()), content.into(), Some(embedding)),
            db,
        )
        .await
        .expect("store chunk");
    }

    async fn seed_doc(db: &SurrealDbClient, id: i64, title: &str) {
        KbDocument::create(
            KbDocument {
                id,
                filename: format!("doc-{id}.md"),
                title: Some(title.to_owned()),
                content_type: None,
                sha256: None,
                size_bytes: None,
                source: None,
                source_url: None,
                created_at: None,
            },
            db,
        )
        .await
        .expect("store doc");
    }

    fn test_config(top_k: usize) -> RetrievalConfig {
        RetrievalConfig {
            kb_candidates: 20,
            kb_top_k: top_k,
            hybrid_search_enabled: true,
            hybrid_keyword_max: 20,
            rerank_enabled: false,
        }
    }

    #[tokio::test]
    async fn empty_store_yields_empty_result() {
        let db = setup_db().await;
        let provider = EmbeddingProvider::hashed(DIM);

        let chunks = retrieve_chunks(&db, &provider, None, "refund", &test_config(5))
            .await
            .expect("retrieve");
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn retrieves_relevant_chunks_with_titles() {
        let db = setup_db().await;
        let provider = EmbeddingProvider::hashed(DIM);

        seed_doc(&db, 1, "Billing FAQ").await;
        seed_chunk(&db, &provider, 1, "refunds are issued within 14 days").await;
        seed_chunk(&db, &provider, 2, "exports can be scheduled nightly").await;
        db.rebuild_indexes().await.expect("rebuild indexes");

        let chunks = retrieve_chunks(
            &db,
            &provider,
            None,
            "how long do refunds take",
            &test_config(5),
        )
        .await
        .expect("retrieve");

        assert!(!chunks.is_empty());
        assert!(chunks.iter().any(|c| c.chunk.id == Some(1)));
        assert!(chunks
            .iter()
            .all(|c| c.title.as_deref() == Some("Billing FAQ")));
    }

    #[tokio::test]
    async fn disabled_rerank_truncates_the_merge_prefix() {
        let db = setup_db().await;
        let provider = EmbeddingProvider::hashed(DIM);

        seed_doc(&db, 1, "Billing FAQ").await;
        for id in 1..=5 {
            seed_chunk(&db, &provider, id, &format!("refund details number {id}")).await;
        }
        db.rebuild_indexes().await.expect("rebuild indexes");

        let wide = retrieve_chunks(&db, &provider, None, "refund", &test_config(10))
            .await
            .expect("retrieve wide");
        let narrow = retrieve_chunks(&db, &provider, None, "refund", &test_config(3))
            .await
            .expect("retrieve narrow");

        assert_eq!(narrow.len(), 3);
        assert_eq!(narrow[..], wide[..3], "top-k must be a prefix of the merge");
    }

    #[tokio::test]
    async fn hybrid_disabled_skips_the_keyword_leg() {
        let db = setup_db().await;
        let provider = EmbeddingProvider::hashed(DIM);

        seed_doc(&db, 1, "Billing FAQ").await;
        // A chunk with an embedding and one that only keyword search could find.
        seed_chunk(&db, &provider, 1, "refund policy for payments").await;
        KbChunk::create(
            KbChunk::new(2, 1, 2, None, "refund refund refund".into(), None),
            &db,
        )
        .await
        .expect("store keyword-only chunk");
        db.rebuild_indexes().await.expect("rebuild indexes");

        let mut config = test_config(5);
        config.hybrid_search_enabled = false;

        let chunks = retrieve_chunks(&db, &provider, None, "refund", &config)
            .await
            .expect("retrieve");

        assert!(
            chunks.iter().all(|c| c.chunk.id != Some(2)),
            "keyword-only chunk must not appear when hybrid search is off"
        );

        config.hybrid_search_enabled = true;
        let chunks = retrieve_chunks(&db, &provider, None, "refund", &config)
            .await
            .expect("retrieve hybrid");
        assert!(
            chunks.iter().any(|c| c.chunk.id == Some(2)),
            "keyword leg should surface the un-embedded chunk"
        );
    }

    #[tokio::test]
    async fn blank_query_returns_no_keyword_candidates() {
        let db = setup_db().await;
        let provider = EmbeddingProvider::hashed(DIM);

        seed_doc(&db, 1, "Billing FAQ").await;
        KbChunk::create(KbChunk::new(1, 1, 1, None, "refund notes".into(), None), &db)
            .await
            .expect("store chunk");
        db.rebuild_indexes().await.expect("rebuild indexes");

        let chunks = retrieve_chunks(&db, &provider, None, "   ", &test_config(5))
            .await
            .expect("retrieve");
        assert!(chunks.is_empty());
    }
}
