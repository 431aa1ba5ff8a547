use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::config::Config;
use crate::store::{DocumentStore, Filter, StoreError, StoreResult};

pub async fn init_db(config: &Config) -> Result<PgPool> {
    let database_url = config
        .database_url
        .clone()
        .unwrap_or_else(|| "postgresql://localhost/djvote".to_string());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&database_url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Document store backed by a single JSONB table keyed by (collection, id).
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Every query filters on `collection = $1 AND ($2::text IS NULL OR id = $2) AND doc @> $3`,
/// so one static statement serves all three filter kinds.
fn filter_params(filter: &Filter) -> (Option<String>, Value) {
    let anything = Value::Object(Default::default());
    match filter {
        Filter::All => (None, anything),
        Filter::Id(id) => (Some(id.clone()), anything),
        Filter::Matches(pattern) => (None, pattern.clone()),
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
        let (id, pattern) = filter_params(filter);
        let rows = sqlx::query(
            r#"
            SELECT doc FROM documents
            WHERE collection = $1 AND ($2::text IS NULL OR id = $2) AND doc @> $3
            ORDER BY seq
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("doc")).collect())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Value>> {
        let (id, pattern) = filter_params(filter);
        let row = sqlx::query(
            r#"
            SELECT doc FROM documents
            WHERE collection = $1 AND ($2::text IS NULL OR id = $2) AND doc @> $3
            ORDER BY seq
            LIMIT 1
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(pattern)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get("doc")))
    }

    async fn insert(&self, collection: &str, id: &str, doc: Value) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, id, doc)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(doc)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn replace(&self, collection: &str, filter: &Filter, doc: Value) -> StoreResult<bool> {
        let (id, pattern) = filter_params(filter);
        let result = sqlx::query(
            r#"
            UPDATE documents SET doc = $4, updated_at = NOW()
            WHERE seq = (
                SELECT seq FROM documents
                WHERE collection = $1 AND ($2::text IS NULL OR id = $2) AND doc @> $3
                ORDER BY seq
                LIMIT 1
            )
              AND doc IS DISTINCT FROM $4
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(pattern)
        .bind(doc)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let (id, pattern) = filter_params(filter);
        let result = sqlx::query(
            r#"
            DELETE FROM documents
            WHERE collection = $1 AND ($2::text IS NULL OR id = $2) AND doc @> $3
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(pattern)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn paginate(
        &self,
        collection: &str,
        filter: &Filter,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<Value>> {
        let (id, pattern) = filter_params(filter);
        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);
        let rows = sqlx::query(
            r#"
            SELECT doc FROM documents
            WHERE collection = $1 AND ($2::text IS NULL OR id = $2) AND doc @> $3
            ORDER BY seq
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(pattern)
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("doc")).collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let (id, pattern) = filter_params(filter);
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM documents
            WHERE collection = $1 AND ($2::text IS NULL OR id = $2) AND doc @> $3
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(pattern)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.max(0) as u64)
    }

    async fn group_count(
        &self,
        collection: &str,
        field: &str,
    ) -> StoreResult<HashMap<String, u64>> {
        let rows = sqlx::query(
            r#"
            SELECT doc->>$2 AS key, COUNT(*) AS total
            FROM documents
            WHERE collection = $1 AND doc->>$2 IS NOT NULL
            GROUP BY 1
            "#,
        )
        .bind(collection)
        .bind(field)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let key: String = row.get("key");
                let total: i64 = row.get("total");
                (key, total.max(0) as u64)
            })
            .collect())
    }

    async fn modify(
        &self,
        collection: &str,
        id: &str,
        apply: &mut (dyn for<'v> FnMut(&'v mut Value) -> bool + Send),
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            tracing::error!("failed to begin transaction: {}", e);
            e
        })?;

        let row = sqlx::query(
            "SELECT doc FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };

        let mut doc: Value = row.get("doc");
        if !apply(&mut doc) {
            // dropping the transaction rolls back and releases the row lock
            return Ok(true);
        }

        sqlx::query(
            "UPDATE documents SET doc = $3, updated_at = NOW() WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .bind(doc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await.map_err(|e| {
            tracing::error!("failed to commit {} {}: {}", collection, id, e);
            e
        })?;

        Ok(true)
    }
}
