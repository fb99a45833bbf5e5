//! Full-text search over `documents.content` using PGroonga.
//!
//! Queries use the `&@~` operator, so PGroonga query syntax (`OR`, `-term`,
//! quoted phrases) is interpreted unless the caller asks for a literal match.
//! Scores come from `pgroonga_score(tableoid, ctid)` and are only comparable
//! within one query.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument};

use rankfuse_core::{CandidateList, Error, Result, TextSearch};

const TEXT_SEARCH_SQL: &str = r#"
    SELECT id,
           title,
           pgroonga_score(tableoid, ctid)::float8 AS score
    FROM documents
    WHERE content &@~ $1
      AND ($2::text IS NULL OR source = $2)
    ORDER BY score DESC, id ASC
    LIMIT $3
"#;

/// Quote `query` so PGroonga matches it as a literal phrase.
///
/// Inner double quotes are backslash-escaped: `say "hi"` becomes
/// `"say \"hi\""`.
pub fn literal_query(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\\\""))
}

/// Full-text search provider using PGroonga.
#[derive(Clone)]
pub struct PgTextSearch {
    pool: Pool<Postgres>,
}

impl PgTextSearch {
    /// Create a new PgTextSearch with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Search documents, optionally scoped to one docset.
    ///
    /// Ties in PGroonga score are ordered by id so repeated runs agree.
    pub async fn search(
        &self,
        query: &str,
        docset: Option<&str>,
        limit: usize,
        literal: bool,
    ) -> Result<CandidateList> {
        let q = if literal {
            literal_query(query)
        } else {
            query.to_string()
        };

        let rows = sqlx::query(TEXT_SEARCH_SQL)
            .bind(&q)
            .bind(docset)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let list = CandidateList::from_ordered(rows.into_iter().map(|row| {
            let id: i64 = row.get("id");
            let score: f64 = row.get("score");
            let title: Option<String> = row.get("title");
            (id, score, title)
        }))?;

        debug!(result_count = list.len(), "Text search complete");
        Ok(list)
    }
}

#[async_trait]
impl TextSearch for PgTextSearch {
    #[instrument(
        skip(self),
        fields(subsystem = "database", component = "search", op = "search_text")
    )]
    async fn search_text(
        &self,
        query: &str,
        docset: &str,
        limit: usize,
        literal: bool,
    ) -> Result<CandidateList> {
        self.search(query, Some(docset), limit, literal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_query_wraps_in_quotes() {
        assert_eq!(literal_query("猫"), "\"猫\"");
    }

    #[test]
    fn test_literal_query_escapes_inner_quotes() {
        assert_eq!(literal_query(r#"say "hi""#), r#""say \"hi\"""#);
    }

    #[test]
    fn test_literal_query_keeps_operators_inside_quotes() {
        assert_eq!(literal_query("cats OR dogs"), "\"cats OR dogs\"");
    }
}
