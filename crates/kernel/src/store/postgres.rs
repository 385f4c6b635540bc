//! PostgreSQL store.
//!
//! Three tables: `vivaio_content` holds records as JSONB alongside their
//! slug and timestamp columns, `vivaio_sequence` the last id per type, and
//! `vivaio_config` configuration values.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::info;

use super::{
    ContentKey, QueryOptions, Store, StoreError, record_timestamp, requested_slug,
    slug_candidates, stamp,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS vivaio_content (
        type_name TEXT NOT NULL,
        id BIGINT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        timestamp BIGINT NOT NULL DEFAULT 0,
        data JSONB NOT NULL,
        PRIMARY KEY (type_name, id)
    )",
    "CREATE INDEX IF NOT EXISTS vivaio_content_sorted
        ON vivaio_content (type_name, timestamp, id)",
    "CREATE TABLE IF NOT EXISTS vivaio_sequence (
        type_name TEXT PRIMARY KEY,
        last_id BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS vivaio_config (
        key TEXT PRIMARY KEY,
        value JSONB NOT NULL
    )",
];

/// Serializes slug assignment across connections.
const SLUG_LOCK: i64 = 0x7669_7661_696f;

/// Store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and create the schema if needed.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables this store uses.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("content schema ready");
        Ok(())
    }

    async fn next_id(
        tx: &mut Transaction<'_, Postgres>,
        type_name: &str,
    ) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO vivaio_sequence (type_name, last_id) VALUES ($1, 1)
             ON CONFLICT (type_name) DO UPDATE SET last_id = vivaio_sequence.last_id + 1
             RETURNING last_id",
        )
        .bind(type_name)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    async fn advance_sequence(
        tx: &mut Transaction<'_, Postgres>,
        type_name: &str,
        id: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO vivaio_sequence (type_name, last_id) VALUES ($1, $2)
             ON CONFLICT (type_name)
             DO UPDATE SET last_id = GREATEST(vivaio_sequence.last_id, EXCLUDED.last_id)",
        )
        .bind(type_name)
        .bind(id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn unique_slug(
        tx: &mut Transaction<'_, Postgres>,
        base: &str,
        key: &ContentKey,
    ) -> Result<String, StoreError> {
        for candidate in slug_candidates(base) {
            let owner: Option<(String, i64)> =
                sqlx::query_as("SELECT type_name, id FROM vivaio_content WHERE slug = $1")
                    .bind(&candidate)
                    .fetch_optional(&mut **tx)
                    .await?;
            match owner {
                None => return Ok(candidate),
                Some((type_name, id)) if type_name == key.type_name && id == key.id => {
                    return Ok(candidate);
                }
                Some(_) => {}
            }
        }
        Ok(base.to_string())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get(&self, type_name: &str, id: i64) -> Result<Option<Value>, StoreError> {
        let data = sqlx::query_scalar("SELECT data FROM vivaio_content WHERE type_name = $1 AND id = $2")
            .bind(type_name)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(data)
    }

    async fn put(
        &self,
        type_name: &str,
        id: Option<i64>,
        mut record: Value,
    ) -> Result<i64, StoreError> {
        if !record.is_object() {
            return Err(StoreError::InvalidRecord("record is not a JSON object".into()));
        }
        let mut tx = self.pool.begin().await?;

        let id = match id {
            Some(id) if id <= 0 => {
                return Err(StoreError::InvalidRecord(format!("invalid id {id}")));
            }
            Some(id) => {
                Self::advance_sequence(&mut tx, type_name, id).await?;
                id
            }
            None => Self::next_id(&mut tx, type_name).await?,
        };
        let key = ContentKey::new(type_name, id);

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SLUG_LOCK)
            .execute(&mut *tx)
            .await?;
        let slug = Self::unique_slug(&mut tx, &requested_slug(&record, &key), &key).await?;
        stamp(&mut record, id, &slug)?;

        sqlx::query(
            "INSERT INTO vivaio_content (type_name, id, slug, timestamp, data)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (type_name, id) DO UPDATE
             SET slug = EXCLUDED.slug, timestamp = EXCLUDED.timestamp, data = EXCLUDED.data",
        )
        .bind(type_name)
        .bind(id)
        .bind(&slug)
        .bind(record_timestamp(&record))
        .bind(&record)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn delete(&self, type_name: &str, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM vivaio_content WHERE type_name = $1 AND id = $2")
            .bind(type_name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, type_name: &str, opts: &QueryOptions) -> Result<Vec<Value>, StoreError> {
        let order = opts.order.as_sql();
        let sql = format!(
            "SELECT data FROM vivaio_content WHERE type_name = $1
             ORDER BY timestamp {order}, id {order}
             LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_scalar(&sql)
            .bind(type_name)
            .bind(opts.limit())
            .bind(opts.offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn content_by_slug(&self, slug: &str) -> Result<Option<(String, Value)>, StoreError> {
        let row = sqlx::query_as("SELECT type_name, data FROM vivaio_content WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn put_config(&self, key: &str, value: Value) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO vivaio_config (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(&value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn config(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let value = sqlx::query_scalar("SELECT value FROM vivaio_config WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
