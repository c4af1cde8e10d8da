use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::{Document, ID_FIELD};
use crate::storage::{DocumentStore, duplicate_id, ensure_id, matches, validate_collection};

/// In-memory document store. Holds documents only for the lifetime of the instance.
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<Document>>>> {
        self.collections
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory store lock poisoned"))
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, collection: &str, mut document: Document) -> Result<String> {
        validate_collection(collection)?;
        let id = ensure_id(&mut document);
        let mut collections = self.lock()?;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.get(ID_FIELD) == document.get(ID_FIELD)) {
            return Err(duplicate_id(collection, &id));
        }
        docs.push(document);
        Ok(id)
    }

    async fn find(&self, collection: &str, criteria: &Document) -> Result<Vec<Document>> {
        validate_collection(collection)?;
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| matches(d, criteria))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save(&self, collection: &str, mut document: Document) -> Result<String> {
        validate_collection(collection)?;
        let id = ensure_id(&mut document);
        let mut collections = self.lock()?;
        let docs = collections.entry(collection.to_string()).or_default();

        match docs
            .iter_mut()
            .find(|d| d.get(ID_FIELD) == document.get(ID_FIELD))
        {
            Some(existing) => *existing = document,
            None => docs.push(document),
        }
        Ok(id)
    }
}
