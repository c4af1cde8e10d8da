use anyhow::Result;
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};

use crate::engine::types::{Document, ID_FIELD};
use crate::storage::{ConnectOptions, DocumentStore, validate_collection};

const ERROR_DOCUMENT_NOT_FOUND: i64 = 1202;
const ERROR_COLLECTION_NOT_FOUND: i64 = 1203;
const ERROR_DUPLICATE_NAME: i64 = 1207;
const CURSOR_BATCH_SIZE: u64 = 1000;

const FIND_QUERY: &str = "FOR d IN @@collection FILTER MATCHES(d, @criteria) RETURN d";

/// Document store backed by an ArangoDB database over its HTTP API.
pub struct ArangoDocumentStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

/// Config value first, then the environment.
fn resolve_param(value: Option<&String>, env_key: &str) -> Option<String> {
    value.cloned().or_else(|| std::env::var(env_key).ok())
}

/// Arango's `_key` for a document: its own `_key`, else the tail of its `_id`.
fn document_key(document: &Document) -> Option<String> {
    if let Some(key) = document.get("_key").and_then(|v| v.as_str()) {
        return Some(key.to_string());
    }
    document
        .get(ID_FIELD)
        .and_then(|v| v.as_str())
        .map(|id| id.rsplit('/').next().unwrap_or(id).to_string())
}

/// Strip server-managed attributes before sending a body.
fn request_body(document: &Document) -> Document {
    let mut body = document.clone();
    body.remove(ID_FIELD);
    body.remove("_rev");
    body
}

fn error_num(body: &serde_json::Value) -> i64 {
    body.get("errorNum").and_then(|v| v.as_i64()).unwrap_or(0)
}

fn arango_error(status: StatusCode, body: &serde_json::Value) -> anyhow::Error {
    let error_msg = body
        .get("errorMessage")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown error");
    anyhow::anyhow!(
        "ArangoDB error {}: {} (HTTP {})",
        error_num(body),
        error_msg,
        status
    )
}

impl ArangoDocumentStore {
    pub fn new(url: &str, database: &str, options: &ConnectOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/_db/{}", url.trim_end_matches('/'), database),
            token: resolve_param(options.token.as_ref(), "ARANGODB_TOKEN"),
            username: resolve_param(options.username.as_ref(), "ARANGODB_USERNAME"),
            password: resolve_param(options.password.as_ref(), "ARANGODB_PASSWORD"),
        })
    }

    /// Token (JWT Bearer) or username/password (Basic), when configured.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(ref token) = self.token {
            request.bearer_auth(token)
        } else if let Some(ref username) = self.username {
            request.basic_auth(username, self.password.as_ref())
        } else {
            request
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, serde_json::Value)> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("ArangoDB request failed: {}", e))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse ArangoDB response: {}", e))?;
        Ok((status, body))
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        let url = format!("{}/_api/collection", self.base_url);
        let (status, body) = self
            .send(
                self.client
                    .post(&url)
                    .json(&serde_json::json!({ "name": collection })),
            )
            .await?;

        if !status.is_success() && error_num(&body) != ERROR_DUPLICATE_NAME {
            return Err(arango_error(status, &body));
        }
        tracing::debug!(collection = %collection, "Created ArangoDB collection");
        Ok(())
    }

    async fn post_document(&self, collection: &str, body: &Document) -> Result<String> {
        let url = format!("{}/_api/document/{}", self.base_url, collection);
        let mut created_collection = false;

        loop {
            let (status, response) = self.send(self.client.post(&url).json(body)).await?;

            if status.is_success() {
                return response
                    .get(ID_FIELD)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("ArangoDB insert returned no _id"));
            }

            if error_num(&response) == ERROR_COLLECTION_NOT_FOUND && !created_collection {
                self.create_collection(collection).await?;
                created_collection = true;
                continue;
            }

            return Err(arango_error(status, &response));
        }
    }
}

#[async_trait]
impl DocumentStore for ArangoDocumentStore {
    fn backend(&self) -> &str {
        "arangodb"
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/_api/version", self.base_url);
        let (status, body) = self.send(self.client.get(&url)).await?;
        if !status.is_success() {
            return Err(arango_error(status, &body));
        }
        Ok(())
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<String> {
        validate_collection(collection)?;

        let mut body = request_body(&document);
        if let Some(key) = document_key(&document) {
            body.insert("_key".to_string(), serde_json::Value::String(key));
        }
        self.post_document(collection, &body).await
    }

    async fn find(&self, collection: &str, criteria: &Document) -> Result<Vec<Document>> {
        validate_collection(collection)?;

        let cursor_url = format!("{}/_api/cursor", self.base_url);
        let query = serde_json::json!({
            "query": FIND_QUERY,
            "bindVars": { "@collection": collection, "criteria": criteria },
            "batchSize": CURSOR_BATCH_SIZE,
        });

        let (status, mut body) = self
            .send(self.client.post(&cursor_url).json(&query))
            .await?;

        if !status.is_success() {
            if error_num(&body) == ERROR_COLLECTION_NOT_FOUND {
                return Ok(Vec::new());
            }
            return Err(arango_error(status, &body));
        }

        let mut docs = Vec::new();
        loop {
            if let Some(serde_json::Value::Array(batch)) = body.get_mut("result") {
                for item in batch.drain(..) {
                    if let serde_json::Value::Object(doc) = item {
                        docs.push(doc);
                    }
                }
            }

            let has_more = body
                .get("hasMore")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let cursor_id = body.get("id").and_then(|v| v.as_str()).map(str::to_string);

            match (has_more, cursor_id) {
                (true, Some(id)) => {
                    let next_url = format!("{}/{}", cursor_url, id);
                    let (status, next) = self.send(self.client.put(&next_url)).await?;
                    if !status.is_success() {
                        return Err(arango_error(status, &next));
                    }
                    body = next;
                }
                _ => break,
            }
        }

        Ok(docs)
    }

    async fn save(&self, collection: &str, document: Document) -> Result<String> {
        validate_collection(collection)?;

        let Some(key) = document_key(&document) else {
            return self.insert(collection, document).await;
        };

        let url = format!("{}/_api/document/{}/{}", self.base_url, collection, key);
        let body = request_body(&document);
        let (status, response) = self.send(self.client.put(&url).json(&body)).await?;

        if status.is_success() {
            return Ok(response
                .get(ID_FIELD)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}/{}", collection, key)));
        }

        match error_num(&response) {
            ERROR_DOCUMENT_NOT_FOUND | ERROR_COLLECTION_NOT_FOUND => {
                let mut body = body;
                body.insert("_key".to_string(), serde_json::Value::String(key));
                self.post_document(collection, &body).await
            }
            _ => Err(arango_error(status, &response)),
        }
    }
}
