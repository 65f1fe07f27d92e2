use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::{Id, Thing};

use crate::{error::AppError, storage::db::SurrealDbClient};

use super::{deserialize_numeric_id, deserialize_option_datetime, serialize_option_datetime};

/// Source document a KB chunk was cut from. Owned by the ingestion surface;
/// read here only to hydrate titles and provenance onto retrieval hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbDocument {
    #[serde(skip_serializing, deserialize_with = "deserialize_numeric_id")]
    pub id: i64,
    pub filename: String,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub sha256: Option<String>,
    pub size_bytes: Option<i64>,
    pub source: Option<String>,
    pub source_url: Option<String>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl KbDocument {
    pub async fn create(doc: KbDocument, db: &SurrealDbClient) -> Result<(), AppError> {
        let id = doc.id;

        db.client
            .query("CREATE type::thing('kb_document', $id) CONTENT $doc;")
            .bind(("id", id))
            .bind(("doc", doc))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;

        Ok(())
    }

    /// Fetch documents for a set of ids, e.g. to attach titles to chunk hits.
    pub async fn get_many(ids: &[i64], db: &SurrealDbClient) -> Result<Vec<KbDocument>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let things: Vec<Thing> = ids
            .iter()
            .map(|id| Thing::from(("kb_document".to_owned(), Id::from(*id))))
            .collect();

        let mut response = db
            .query("SELECT * FROM kb_document WHERE id IN $things;")
            .bind(("things", things))
            .await
            .map_err(AppError::Database)?;

        response = response.check().map_err(AppError::Database)?;
        let docs: Vec<KbDocument> = response.take(0).map_err(AppError::Database)?;

        Ok(docs)
    }
}
