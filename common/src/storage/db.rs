use std::ops::Deref;

use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};
use tracing::warn;

use crate::error::AppError;

use super::types::StoredObject;

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Define the tables and indexes the enricher relies on. The HNSW index
    /// dimension must match the embedding model loaded at startup; re-running
    /// with a different dimension overwrites the index definition.
    pub async fn ensure_initialized(&self, embedding_dimension: usize) -> Result<(), AppError> {
        self.client
            .query(
                "DEFINE TABLE IF NOT EXISTS enriched_ticket SCHEMALESS;
                DEFINE TABLE IF NOT EXISTS processed_event SCHEMALESS;
                DEFINE TABLE IF NOT EXISTS kb_document SCHEMALESS;
                DEFINE TABLE IF NOT EXISTS kb_chunk SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_enriched_ticket_status ON enriched_ticket FIELDS status;",
            )
            .await?
            .check()?;

        self.client
            .query(format!(
                "DEFINE INDEX OVERWRITE idx_embedding_kb_chunk ON kb_chunk FIELDS embedding \
                 HNSW DIMENSION {embedding_dimension} DIST EUCLIDEAN TYPE F32 EFC 100 M 8;"
            ))
            .await?
            .check()?;

        self.ensure_fts_indexes().await?;

        Ok(())
    }

    async fn ensure_fts_indexes(&self) -> Result<(), AppError> {
        let snowball_sql = "
            DEFINE ANALYZER IF NOT EXISTS kb_en_fts_analyzer TOKENIZERS class, punct FILTERS lowercase, ascii, snowball(english);
            DEFINE INDEX IF NOT EXISTS kb_chunk_fts_content_idx ON TABLE kb_chunk FIELDS content SEARCH ANALYZER kb_en_fts_analyzer BM25;
        ";

        let snowball_result = match self.client.query(snowball_sql).await {
            Ok(response) => response.check().map(|_| ()),
            Err(err) => Err(err),
        };

        if let Err(err) = snowball_result {
            // Some builds ship without the snowball filter; fall back to plain ascii.
            warn!(error = %err, "snowball analyzer unavailable, falling back to ascii");
            let fallback_sql = "
                DEFINE ANALYZER OVERWRITE kb_en_fts_analyzer TOKENIZERS class, punct FILTERS lowercase, ascii;
                DEFINE INDEX IF NOT EXISTS kb_chunk_fts_content_idx ON TABLE kb_chunk FIELDS content SEARCH ANALYZER kb_en_fts_analyzer BM25;
            ";
            self.client.query(fallback_sql).await?.check()?;
        }

        Ok(())
    }

    pub async fn rebuild_indexes(&self) -> Result<(), Error> {
        self.client
            .query("REBUILD INDEX IF EXISTS idx_embedding_kb_chunk ON kb_chunk")
            .await?;
        self.client
            .query("REBUILD INDEX IF EXISTS kb_chunk_fts_content_idx ON kb_chunk")
            .await?;
        Ok(())
    }

    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}
