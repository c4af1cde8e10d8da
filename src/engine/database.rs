use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::engine::types::*;
use crate::storage::{ConnectOptions, DocumentStore, connect};

/// Turn a task identifier into the name reports carry as their `source`.
///
/// Splits on underscores, capitalizes each segment (first letter upper, rest
/// lower) and joins them: `create_indexes` becomes `CreateIndexes`.
pub fn canonical_task_name(task: &str) -> String {
    task.split('_')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Database handle given to a task: files reports under the task's name and
/// offers get-or-create helpers over arbitrary collections.
pub struct Database {
    source: String,
    store: Arc<dyn DocumentStore>,
}

impl Database {
    /// Connect to `database` on `host` on behalf of `task`. Fails if the
    /// backend cannot be reached; there is no retry.
    pub async fn open(
        task: &str,
        host: &str,
        database: &str,
        options: &ConnectOptions,
    ) -> Result<Self> {
        let store = connect(host, database, options).await?;
        Ok(Self::with_store(task, store))
    }

    /// Wrap an already-open store.
    pub fn with_store(task: &str, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            source: canonical_task_name(task),
            store,
        }
    }

    /// Canonical task name written into every report's `source`.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// File an unread report. Prefer [`success`](Self::success),
    /// [`warning`](Self::warning), [`note`](Self::note) and
    /// [`failure`](Self::failure).
    pub async fn report(
        &self,
        status: ReportStatus,
        message: impl Into<Message>,
        additional: Option<Document>,
    ) -> Result<String> {
        let report = Report::new(status, &self.source, message.into(), additional);
        let id = self
            .store
            .insert(REPORTS_COLLECTION, report.to_document()?)
            .await?;
        debug!(source = %self.source, status = %status, id = %id, "Report filed");
        Ok(id)
    }

    pub async fn success(
        &self,
        message: impl Into<Message>,
        additional: Option<Document>,
    ) -> Result<String> {
        self.report(ReportStatus::Success, message, additional).await
    }

    pub async fn warning(
        &self,
        message: impl Into<Message>,
        additional: Option<Document>,
    ) -> Result<String> {
        self.report(ReportStatus::Warning, message, additional).await
    }

    pub async fn note(
        &self,
        message: impl Into<Message>,
        additional: Option<Document>,
    ) -> Result<String> {
        self.report(ReportStatus::Note, message, additional).await
    }

    pub async fn failure(
        &self,
        message: impl Into<Message>,
        additional: Option<Document>,
    ) -> Result<String> {
        self.report(ReportStatus::Failure, message, additional).await
    }

    /// First document in `collection` matching `criteria` with `updated_at`
    /// refreshed, or a new unsaved document built from `criteria` with both
    /// timestamps set. Nothing is written.
    pub async fn get_or_initialize(&self, collection: &str, criteria: &Document) -> Result<Document> {
        let now = timestamp();
        let mut document = match self.store.find(collection, criteria).await?.into_iter().next() {
            Some(existing) => existing,
            None => {
                let mut fresh = criteria.clone();
                fresh.insert("created_at".to_string(), now.clone());
                fresh
            }
        };
        document.insert("updated_at".to_string(), now);
        Ok(document)
    }

    /// [`get_or_initialize`](Self::get_or_initialize), merge `info` over the
    /// result and save it. Last write wins; there is no concurrency guard.
    pub async fn get_or_create(
        &self,
        collection: &str,
        criteria: &Document,
        info: Document,
    ) -> Result<Document> {
        let mut document = self.get_or_initialize(collection, criteria).await?;
        document.extend(info);
        let id = self.store.save(collection, document.clone()).await?;
        document.insert(ID_FIELD.to_string(), serde_json::Value::String(id));
        Ok(document)
    }

    /// Raw access to a named collection.
    pub fn collection<'a>(&'a self, name: &'a str) -> Collection<'a> {
        Collection {
            name,
            store: self.store.as_ref(),
        }
    }
}

/// A named collection, for operations the report helpers don't cover.
pub struct Collection<'a> {
    name: &'a str,
    store: &'a dyn DocumentStore,
}

impl Collection<'_> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub async fn insert(&self, document: Document) -> Result<String> {
        self.store.insert(self.name, document).await
    }

    pub async fn find(&self, criteria: &Document) -> Result<Vec<Document>> {
        self.store.find(self.name, criteria).await
    }

    pub async fn find_one(&self, criteria: &Document) -> Result<Option<Document>> {
        Ok(self.store.find(self.name, criteria).await?.into_iter().next())
    }

    pub async fn find_all(&self) -> Result<Vec<Document>> {
        self.store.find(self.name, &Document::new()).await
    }

    pub async fn count(&self, criteria: &Document) -> Result<usize> {
        Ok(self.store.find(self.name, criteria).await?.len())
    }

    pub async fn save(&self, document: Document) -> Result<String> {
        self.store.save(self.name, document).await
    }
}
