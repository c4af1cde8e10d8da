pub mod arangodb_store;
pub mod json_store;
pub mod memory_store;
pub mod sqlite_store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tracing::info;

use crate::engine::types::{Document, ID_FIELD};

/// Default ceiling for any network operation against the store.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimal CRUD/query capability over named collections of JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name for logs (e.g. "memory", "arangodb").
    fn backend(&self) -> &str;

    /// Check the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Insert a new document, assigning an `_id` if it has none. Returns the id.
    /// An `_id` already present in the collection is an error.
    async fn insert(&self, collection: &str, document: Document) -> Result<String>;

    /// All documents whose top-level fields equal every field in `criteria`,
    /// in backend order. A missing collection yields no documents.
    async fn find(&self, collection: &str, criteria: &Document) -> Result<Vec<Document>>;

    /// Replace the document with the same `_id`, inserting it when absent. Returns the id.
    async fn save(&self, collection: &str, document: Document) -> Result<String>;
}

/// Connection parameters beyond host and database name.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub timeout: Duration,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            username: None,
            password: None,
            token: None,
        }
    }
}

/// Open a store for `database` on `host` and check it answers.
///
/// The backend is picked from the host's scheme:
/// `memory:`, `file://<dir>`, `sqlite://<dir>` (or `sqlite::memory:`),
/// `http(s)://...` and bare `host[:port]` for ArangoDB.
pub async fn connect(
    host: &str,
    database: &str,
    options: &ConnectOptions,
) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = if host == "memory:" || host.starts_with("memory://") {
        Arc::new(memory_store::MemoryDocumentStore::new())
    } else if let Some(dir) = host.strip_prefix("file://") {
        Arc::new(json_store::JsonDocumentStore::new(
            PathBuf::from(dir).join(database),
        ))
    } else if host == "sqlite::memory:" {
        Arc::new(sqlite_store::SqliteDocumentStore::connect(host, options.timeout).await?)
    } else if let Some(dir) = host.strip_prefix("sqlite://") {
        let path = PathBuf::from(dir).join(format!("{}.db", database));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let url = format!("sqlite://{}?mode=rwc", path.to_string_lossy());
        Arc::new(sqlite_store::SqliteDocumentStore::connect(&url, options.timeout).await?)
    } else {
        let url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        Arc::new(arangodb_store::ArangoDocumentStore::new(&url, database, options)?)
    };

    store
        .ping()
        .await
        .with_context(|| format!("Database at '{}' is unreachable", host))?;

    info!(backend = store.backend(), database = %database, "Connected to document store");
    Ok(store)
}

/// True when every criteria field is present in `document` with an equal value.
pub fn matches(document: &Document, criteria: &Document) -> bool {
    criteria
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}

/// Collection names end up in file names and queries.
pub fn validate_collection(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if !valid {
        anyhow::bail!("Invalid collection name: '{}'", name);
    }
    Ok(())
}

/// The document's `_id` as a string, assigning a fresh UUID when it has none.
pub fn ensure_id(document: &mut Document) -> String {
    match document.get(ID_FIELD) {
        Some(serde_json::Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            document.insert(ID_FIELD.to_string(), serde_json::Value::String(id.clone()));
            id
        }
    }
}

/// Error for an insert whose `_id` is already taken.
pub fn duplicate_id(collection: &str, id: &str) -> anyhow::Error {
    anyhow::anyhow!("Duplicate _id '{}' in '{}'", id, collection)
}
