//! Embedding model registry backed by the `embedding_models` table.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use rankfuse_core::{Error, ModelRegistry, Result};

/// Reads registered embedding models and their dimensionality.
#[derive(Clone)]
pub struct PgModelRegistry {
    pool: Pool<Postgres>,
}

impl PgModelRegistry {
    /// Create a new PgModelRegistry with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Registered dims for one model, or `UnregisteredModel`.
    pub async fn dims_for(&self, name: &str) -> Result<usize> {
        let dims: Option<i32> = sqlx::query_scalar("SELECT dims FROM embedding_models WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        let dims = dims.ok_or_else(|| Error::UnregisteredModel(name.to_string()))?;
        usize::try_from(dims)
            .map_err(|_| Error::Internal(format!("model '{}' has invalid dims {}", name, dims)))
    }

    /// Register a model, updating its dims if it already exists.
    pub async fn register(&self, name: &str, dims: usize) -> Result<()> {
        let dims = i32::try_from(dims)
            .map_err(|_| Error::InvalidInput(format!("dims {} out of range", dims)))?;
        sqlx::query(
            r#"
            INSERT INTO embedding_models (name, dims)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET dims = EXCLUDED.dims
            "#,
        )
        .bind(name)
        .bind(dims)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl ModelRegistry for PgModelRegistry {
    async fn model_dimensions(&self) -> Result<BTreeMap<String, usize>> {
        let rows = sqlx::query("SELECT name, dims FROM embedding_models ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.into_iter()
            .map(|row| {
                let name: String = row.get("name");
                let dims: i32 = row.get("dims");
                let dims = usize::try_from(dims).map_err(|_| {
                    Error::Internal(format!("model '{}' has invalid dims {}", name, dims))
                })?;
                Ok((name, dims))
            })
            .collect()
    }
}
