use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::engine::types::{Document, ID_FIELD};
use crate::storage::{DocumentStore, duplicate_id, ensure_id, matches, validate_collection};

/// File-based JSON document store. Each collection is a JSON array in its own file.
pub struct JsonDocumentStore {
    base_dir: PathBuf,
    lock: RwLock<()>,
}

impl JsonDocumentStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            lock: RwLock::new(()),
        }
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", collection))
    }

    async fn read_collection(&self, collection: &str) -> Result<Vec<Document>> {
        let path = self.collection_path(collection);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read collection file: {}", path.display())));
            }
        };
        let docs: Vec<Document> = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse collection: {}", collection))?;
        Ok(docs)
    }

    async fn write_collection(&self, collection: &str, docs: &[Document]) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .with_context(|| format!("Failed to create store dir: {}", self.base_dir.display()))?;

        let path = self.collection_path(collection);
        let tmp_path = path.with_extension("json.tmp");

        let data = serde_json::to_string_pretty(docs)?;
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    fn backend(&self) -> &str {
        "json"
    }

    async fn ping(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .with_context(|| format!("Failed to create store dir: {}", self.base_dir.display()))
    }

    async fn insert(&self, collection: &str, mut document: Document) -> Result<String> {
        validate_collection(collection)?;
        let _lock = self.lock.write().await;

        let id = ensure_id(&mut document);
        let mut docs = self.read_collection(collection).await?;
        if docs.iter().any(|d| d.get(ID_FIELD) == document.get(ID_FIELD)) {
            return Err(duplicate_id(collection, &id));
        }
        docs.push(document);
        self.write_collection(collection, &docs).await?;
        Ok(id)
    }

    async fn find(&self, collection: &str, criteria: &Document) -> Result<Vec<Document>> {
        validate_collection(collection)?;
        let _lock = self.lock.read().await;

        let docs = self.read_collection(collection).await?;
        Ok(docs.into_iter().filter(|d| matches(d, criteria)).collect())
    }

    async fn save(&self, collection: &str, mut document: Document) -> Result<String> {
        validate_collection(collection)?;
        let _lock = self.lock.write().await;

        let id = ensure_id(&mut document);
        let mut docs = self.read_collection(collection).await?;
        match docs
            .iter_mut()
            .find(|d| d.get(ID_FIELD) == document.get(ID_FIELD))
        {
            Some(existing) => *existing = document,
            None => docs.push(document),
        }
        self.write_collection(collection, &docs).await?;
        Ok(id)
    }
}
