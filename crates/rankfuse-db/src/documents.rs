//! Document storage.

use std::collections::BTreeMap;

use sqlx::{Pool, Postgres, Row};

use rankfuse_core::{DocumentId, Error, Result, Vector};

use crate::embeddings::UPSERT_EMBEDDING_SQL;

/// A new document to insert.
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Docset the document belongs to (`documents.source`).
    pub source: String,
    pub title: Option<String>,
    pub body: String,
}

impl NewDocument {
    /// Text to embed for this document: `title\nbody`, or the body alone
    /// when there is no title.
    pub fn embedding_text(&self) -> String {
        match self.title.as_deref().filter(|t| !t.is_empty()) {
            Some(title) => format!("{}\n{}", title, self.body),
            None => self.body.clone(),
        }
    }
}

/// Repository for the `documents` table.
#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentRepository {
    /// Create a new PgDocumentRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a document and return its id.
    ///
    /// `content` is derived by the database from title and body.
    pub async fn insert(&self, doc: &NewDocument) -> Result<DocumentId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO documents (source, title, body)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&doc.source)
        .bind(&doc.title)
        .bind(&doc.body)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }

    /// Insert a document together with its embedding for `model`.
    ///
    /// Both rows are written in one transaction, so a failed embedding upsert
    /// leaves no orphan document behind.
    pub async fn insert_with_embedding(
        &self,
        doc: &NewDocument,
        model: &str,
        embedding: &Vector,
    ) -> Result<DocumentId> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO documents (source, title, body)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&doc.source)
        .bind(&doc.title)
        .bind(&doc.body)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query(UPSERT_EMBEDDING_SQL)
            .bind(id)
            .bind(model)
            .bind(embedding.as_slice().len() as i32)
            .bind(embedding)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(id)
    }

    /// Leading `length` characters of `content` for each id.
    pub async fn snippets(
        &self,
        ids: &[DocumentId],
        length: usize,
    ) -> Result<BTreeMap<DocumentId, String>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT id, left(COALESCE(content, ''), $2) AS snippet
            FROM documents
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(length as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<i64, _>("id"), row.get::<String, _>("snippet")))
            .collect())
    }

    /// Number of documents per docset.
    pub async fn count_by_source(&self) -> Result<BTreeMap<String, i64>> {
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS n FROM documents GROUP BY source ORDER BY source",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("source"), row.get::<i64, _>("n")))
            .collect())
    }
}
