//! Document embeddings: vector similarity search and storage.
//!
//! Embeddings for different models live side by side in
//! `document_embeddings` with a plain `vector` column. Searches cast both
//! sides to `halfvec(dims)` for the model being queried, which is why the
//! registered dimensionality is needed before any SQL can be built.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument};

use rankfuse_core::{CandidateList, DocumentId, Error, Result, Vector, VectorSearch};

use crate::registry::PgModelRegistry;

pub(crate) const UPSERT_EMBEDDING_SQL: &str = r#"
    INSERT INTO document_embeddings (document_id, model, dims, embedding)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (document_id, model)
    DO UPDATE SET
      embedding = EXCLUDED.embedding,
      dims = EXCLUDED.dims,
      created_at = now()
"#;

/// Build the similarity query for a model with `dims` dimensions.
///
/// `dims` comes from `embedding_models`, never from user input, and is an
/// integer, so interpolating it is safe.
fn vector_search_sql(dims: usize) -> String {
    format!(
        r#"
        SELECT d.id,
               d.title,
               (1 - (e.embedding::halfvec({dims}) <=> $1::vector::halfvec({dims})))::float8 AS similarity
        FROM document_embeddings e
        JOIN documents d ON d.id = e.document_id
        WHERE e.model = $2
          AND ($3::text IS NULL OR d.source = $3)
        ORDER BY e.embedding::halfvec({dims}) <=> $1::vector::halfvec({dims}) ASC, d.id ASC
        LIMIT $4
        "#,
        dims = dims
    )
}

/// Cosine similarity search over stored document embeddings.
#[derive(Clone)]
pub struct PgVectorSearch {
    pool: Pool<Postgres>,
    registry: PgModelRegistry,
}

impl PgVectorSearch {
    /// Create a new PgVectorSearch with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            registry: PgModelRegistry::new(pool.clone()),
            pool,
        }
    }

    /// Search documents embedded with `model`, optionally scoped to one docset.
    ///
    /// Score is `1 - cosine distance`.
    pub async fn search(
        &self,
        query_vector: &Vector,
        model: &str,
        docset: Option<&str>,
        limit: usize,
    ) -> Result<CandidateList> {
        let dims = self.registry.dims_for(model).await?;
        let actual = query_vector.as_slice().len();
        if actual != dims {
            return Err(Error::DimensionMismatch {
                model: model.to_string(),
                expected: dims,
                actual,
            });
        }

        let rows = sqlx::query(&vector_search_sql(dims))
            .bind(query_vector)
            .bind(model)
            .bind(docset)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let list = CandidateList::from_ordered(rows.into_iter().map(|row| {
            let id: i64 = row.get("id");
            let similarity: f64 = row.get("similarity");
            let title: Option<String> = row.get("title");
            (id, similarity, title)
        }))?;

        debug!(result_count = list.len(), dims, "Vector search complete");
        Ok(list)
    }
}

#[async_trait]
impl VectorSearch for PgVectorSearch {
    #[instrument(
        skip(self, query_vector),
        fields(subsystem = "database", component = "embeddings", op = "search_vector")
    )]
    async fn search_vector(
        &self,
        query_vector: &Vector,
        model: &str,
        docset: &str,
        limit: usize,
    ) -> Result<CandidateList> {
        self.search(query_vector, model, Some(docset), limit).await
    }
}

/// A document whose embedding is missing or stale for some model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDocument {
    pub id: DocumentId,
    pub content: String,
}

/// Selection of documents to (re-)embed.
#[derive(Debug, Clone, Default)]
pub struct PendingFilter<'a> {
    /// Restrict to one docset.
    pub docset: Option<&'a str>,
    /// Include documents that already have a current embedding.
    pub force: bool,
    /// Maximum number of documents; `None` or 0 means all.
    pub limit: Option<usize>,
}

impl PendingFilter<'_> {
    /// `LIMIT` bind value; NULL selects every pending document.
    fn sql_limit(&self) -> Option<i64> {
        self.limit.filter(|&n| n > 0).map(|n| n as i64)
    }
}

/// Repository for stored document embeddings.
#[derive(Clone)]
pub struct PgEmbeddingRepository {
    pool: Pool<Postgres>,
}

impl PgEmbeddingRepository {
    /// Create a new PgEmbeddingRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Documents lacking an embedding for `model`, or whose stored embedding
    /// has dims other than `dims`. With `force`, every document.
    pub async fn pending(
        &self,
        model: &str,
        dims: usize,
        filter: PendingFilter<'_>,
    ) -> Result<Vec<PendingDocument>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, COALESCE(d.content, '') AS content
            FROM documents d
            LEFT JOIN document_embeddings e
              ON e.document_id = d.id AND e.model = $1
            WHERE ($2 OR e.document_id IS NULL OR e.dims IS DISTINCT FROM $3)
              AND ($4::text IS NULL OR d.source = $4)
            ORDER BY d.id
            LIMIT $5
            "#,
        )
        .bind(model)
        .bind(filter.force)
        .bind(dims as i32)
        .bind(filter.docset)
        .bind(filter.sql_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| PendingDocument {
                id: row.get("id"),
                content: row.get("content"),
            })
            .collect())
    }

    /// Insert or replace the embedding of one document for `model`.
    pub async fn upsert(
        &self,
        document_id: DocumentId,
        model: &str,
        embedding: &Vector,
    ) -> Result<()> {
        let dims = embedding.as_slice().len() as i32;
        sqlx::query(UPSERT_EMBEDDING_SQL)
            .bind(document_id)
            .bind(model)
            .bind(dims)
            .bind(embedding)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Upsert a batch of embeddings in one transaction.
    pub async fn upsert_batch(
        &self,
        model: &str,
        items: &[(DocumentId, Vector)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        for (document_id, embedding) in items {
            sqlx::query(UPSERT_EMBEDDING_SQL)
                .bind(document_id)
                .bind(model)
                .bind(embedding.as_slice().len() as i32)
                .bind(embedding)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
