use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::engine::types::Document;
use crate::storage::{DocumentStore, ensure_id, matches, validate_collection};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body TEXT NOT NULL,
    UNIQUE (collection, id)
)";

/// SQLite-backed document store. Documents are kept as JSON text, one row each,
/// and matched against criteria after loading.
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Connect to `url` (e.g. `sqlite://data/app.db?mode=rwc` or `sqlite::memory:`)
    /// and create the documents table if needed.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        // A single connection keeps `sqlite::memory:` pointing at one database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect(url)
            .await
            .with_context(|| format!("Failed to open SQLite database: {}", url))?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to create documents table")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert(&self, collection: &str, mut document: Document) -> Result<String> {
        validate_collection(collection)?;
        let id = ensure_id(&mut document);
        let body = serde_json::to_string(&document)?;

        sqlx::query("INSERT INTO documents (collection, id, body) VALUES (?, ?, ?)")
            .bind(collection)
            .bind(&id)
            .bind(body)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert into '{}'", collection))?;

        Ok(id)
    }

    async fn find(&self, collection: &str, criteria: &Document) -> Result<Vec<Document>> {
        validate_collection(collection)?;

        let rows = sqlx::query("SELECT body FROM documents WHERE collection = ? ORDER BY seq")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to query '{}'", collection))?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row.try_get("body")?;
            let doc: Document = serde_json::from_str(&body)
                .with_context(|| format!("Corrupt document in '{}'", collection))?;
            if matches(&doc, criteria) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    async fn save(&self, collection: &str, mut document: Document) -> Result<String> {
        validate_collection(collection)?;
        let id = ensure_id(&mut document);
        let body = serde_json::to_string(&document)?;

        sqlx::query(
            "INSERT INTO documents (collection, id, body) VALUES (?, ?, ?)
             ON CONFLICT (collection, id) DO UPDATE SET body = excluded.body",
        )
        .bind(collection)
        .bind(&id)
        .bind(body)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save into '{}'", collection))?;

        Ok(id)
    }
}
