//! Tests that the retrieval SQL uses the expected PGroonga and pgvector
//! operators.
//!
//! These are unit tests that verify the SQL query strings are correctly formed.
//! They do not require a database connection.

#[cfg(test)]
mod search_sql {
    /// Text search must go through PGroonga, not tsvector.
    #[test]
    fn test_text_search_uses_pgroonga() {
        let source = include_str!("../src/search.rs");

        assert!(source.contains("content &@~ $1"));
        assert!(source.contains("pgroonga_score(tableoid, ctid)"));
        assert!(
            !source.contains("to_tsvector"),
            "search.rs should not use tsvector full-text search"
        );
    }

    /// Text search is scoped by documents.source.
    #[test]
    fn test_text_search_scoped_to_docset() {
        let source = include_str!("../src/search.rs");
        assert!(source.contains("source = $2"));
    }

    /// Vector search casts to halfvec and ranks by cosine distance.
    #[test]
    fn test_vector_search_uses_cosine_halfvec() {
        let source = include_str!("../src/embeddings.rs");

        assert!(source.contains("<=>"), "cosine distance operator missing");
        assert!(source.contains("halfvec({dims})"));
        assert!(source.contains("1 - (e.embedding"));
        assert!(
            !source.contains("<->"),
            "embeddings.rs should not use L2 distance"
        );
    }

    /// Re-embedding replaces rows instead of duplicating them.
    #[test]
    fn test_embedding_upsert_on_document_model() {
        let source = include_str!("../src/embeddings.rs");
        assert!(source.contains("ON CONFLICT (document_id, model)"));
        assert!(source.contains("created_at = now()"));
    }
}
