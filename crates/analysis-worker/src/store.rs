//! Key-value stores backing the evaluation cache

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::error::WorkerError;

/// Minimal get/set contract. Values are JSON text.
///
/// Writes are first-writer-wins: every key is derived from immutable inputs, so
/// a second write for the same key carries the same value and may be dropped.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, WorkerError>> + Send;

    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), WorkerError>> + Send;

    /// Drop an entry so the next `set` can store a fresh value.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), WorkerError>> + Send;
}

/// Shared handle; lets several runs use one store.
impl<T: CacheStore> CacheStore for Arc<T> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, WorkerError>> + Send {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), WorkerError>> + Send {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> impl Future<Output = Result<(), WorkerError>> + Send {
        (**self).remove(key)
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, WorkerError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), WorkerError> {
        self.entries
            .lock()
            .await
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), WorkerError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Postgres-backed store using a single `catchfish_cache` table.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the cache table exists.
    pub async fn connect(database_url: &str) -> Result<Self, WorkerError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), WorkerError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS catchfish_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl CacheStore for PgStore {
    async fn get(&self, key: &str) -> Result<Option<String>, WorkerError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM catchfish_cache WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), WorkerError> {
        sqlx::query(
            "INSERT INTO catchfish_cache (key, value) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), WorkerError> {
        sqlx::query("DELETE FROM catchfish_cache WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
