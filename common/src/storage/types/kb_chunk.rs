use serde::{Deserialize, Serialize};

use crate::{error::AppError, storage::db::SurrealDbClient};

use super::deserialize_opt_numeric_id;

/// One retrievable slice of a knowledge-base document. Written by the KB
/// ingestion surface; the enricher only reads these rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbChunk {
    #[serde(
        default,
        skip_serializing,
        deserialize_with = "deserialize_opt_numeric_id"
    )]
    pub id: Option<i64>,
    pub doc_id: i64,
    pub chunk_index: i64,
    pub heading_path: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Search hit including the raw engine score (euclidean distance for the
/// dense leg, BM25 score for the keyword leg).
#[derive(Debug, Clone, PartialEq)]
pub struct KbChunkSearchResult {
    pub chunk: KbChunk,
    pub score: f32,
}

#[derive(Deserialize)]
struct DenseRow {
    #[serde(deserialize_with = "deserialize_opt_numeric_id", default)]
    id: Option<i64>,
    doc_id: i64,
    chunk_index: i64,
    heading_path: Option<String>,
    content: String,
    distance: f32,
}

#[derive(Deserialize)]
struct KeywordRow {
    #[serde(deserialize_with = "deserialize_opt_numeric_id", default)]
    id: Option<i64>,
    doc_id: i64,
    chunk_index: i64,
    heading_path: Option<String>,
    content: String,
    score: f32,
}

impl KbChunk {
    pub fn new(
        id: i64,
        doc_id: i64,
        chunk_index: i64,
        heading_path: Option<String>,
        content: String,
        embedding: Option<Vec<f32>>,
    ) -> Self {
        Self {
            id: Some(id),
            doc_id,
            chunk_index,
            heading_path,
            content,
            embedding,
        }
    }

    pub async fn create(chunk: KbChunk, db: &SurrealDbClient) -> Result<(), AppError> {
        let id = chunk
            .id
            .ok_or_else(|| AppError::Validation("kb chunk requires an id".into()))?;

        db.client
            .query("CREATE type::thing('kb_chunk', $id) CONTENT $chunk;")
            .bind(("id", id))
            .bind(("chunk", chunk))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;

        Ok(())
    }

    /// Nearest chunks by euclidean distance over the HNSW index. Rows without
    /// an embedding never qualify. A dimensionality mismatch between the
    /// stored vectors and the query surfaces as a store error.
    pub async fn vector_search(
        take: usize,
        query_embedding: Vec<f32>,
        db: &SurrealDbClient,
    ) -> Result<Vec<KbChunkSearchResult>, AppError> {
        let sql = format!(
            r#"
            SELECT
                id,
                doc_id,
                chunk_index,
                heading_path,
                content,
                vector::distance::euclidean(embedding, $embedding) AS distance
            FROM kb_chunk
            WHERE embedding != NONE
              AND embedding <|{take},100|> $embedding
            ORDER BY distance ASC
            LIMIT {take};
            "#
        );

        let mut response = db
            .query(&sql)
            .bind(("embedding", query_embedding))
            .await
            .map_err(AppError::Database)?;

        response = response.check().map_err(AppError::Database)?;
        let rows: Vec<DenseRow> = response.take(0).map_err(AppError::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| KbChunkSearchResult {
                chunk: KbChunk {
                    id: row.id,
                    doc_id: row.doc_id,
                    chunk_index: row.chunk_index,
                    heading_path: row.heading_path,
                    content: row.content,
                    embedding: None,
                },
                score: row.distance,
            })
            .collect())
    }

    /// BM25 keyword candidates ordered by score descending, ties broken by
    /// ascending chunk id. Blank queries return nothing.
    pub async fn keyword_search(
        take: usize,
        terms: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<KbChunkSearchResult>, AppError> {
        if terms.trim().is_empty() {
            return Ok(Vec::new());
        }

        let limit = i64::try_from(take).unwrap_or(i64::MAX);

        let sql = r#"
            SELECT
                id,
                doc_id,
                chunk_index,
                heading_path,
                content,
                IF search::score(0) != NONE THEN search::score(0) ELSE 0 END AS score
            FROM kb_chunk
            WHERE content @0@ $terms
            ORDER BY score DESC, id ASC
            LIMIT $limit;
        "#;

        let mut response = db
            .query(sql)
            .bind(("terms", terms.to_owned()))
            .bind(("limit", limit))
            .await
            .map_err(AppError::Database)?;

        response = response.check().map_err(AppError::Database)?;
        let rows: Vec<KeywordRow> = response.take(0).map_err(AppError::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| KbChunkSearchResult {
                chunk: KbChunk {
                    id: row.id,
                    doc_id: row.doc_id,
                    chunk_index: row.chunk_index,
                    heading_path: row.heading_path,
                    content: row.content,
                    embedding: None,
                },
                score: row.score,
            })
            .collect())
    }
}
