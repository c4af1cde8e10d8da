use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::failure::Failure;

/// A stored document: a JSON object keyed by field name.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Field holding a document's identity in every storage backend.
pub const ID_FIELD: &str = "_id";

/// Collection that receives task reports.
pub const REPORTS_COLLECTION: &str = "reports";

/// Current time in the format every timestamp field is stored with.
pub fn timestamp() -> serde_json::Value {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(at: DateTime<Utc>) -> serde_json::Value {
    serde_json::Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Outcome category of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Success,
    Warning,
    Note,
    Failure,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Success => write!(f, "SUCCESS"),
            ReportStatus::Warning => write!(f, "WARNING"),
            ReportStatus::Note => write!(f, "NOTE"),
            ReportStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

/// What a report says: plain text, or a captured failure with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Failure(Failure),
}

impl Message {
    /// Text stored in the report's `message` field.
    pub fn text(&self) -> &str {
        match self {
            Message::Text(text) => text,
            Message::Failure(failure) => &failure.message,
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<Failure> for Message {
    fn from(failure: Failure) -> Self {
        Message::Failure(failure)
    }
}

impl From<&anyhow::Error> for Message {
    fn from(err: &anyhow::Error) -> Self {
        Message::Failure(Failure::from_error(err))
    }
}

/// An audit document in the `reports` collection. Reports are only ever inserted.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub status: ReportStatus,
    pub read: bool,
    pub message: String,
    pub source: String,
    pub created_at: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<Failure>,
    /// Extra fields merged in verbatim; they win over the fields above.
    #[serde(flatten)]
    pub additional: Document,
}

impl Report {
    pub fn new(
        status: ReportStatus,
        source: &str,
        message: Message,
        additional: Option<Document>,
    ) -> Self {
        let text = message.text().to_string();
        let exception = match message {
            Message::Failure(failure) => Some(failure),
            Message::Text(_) => None,
        };

        Self {
            status,
            read: false,
            message: text,
            source: source.to_string(),
            created_at: timestamp(),
            exception,
            additional: additional.unwrap_or_default(),
        }
    }

    /// Flatten into the document shape that gets stored.
    pub fn to_document(&self) -> anyhow::Result<Document> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => anyhow::bail!("Report serialized to a non-object value: {}", other),
        }
    }
}

/// Options handed to a task: the base configuration with command-line overrides applied.
/// Open-ended so any task can ask for any key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(Document);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Document) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(|v| v.as_bool())
    }

    /// Integer option; overrides arrive as strings, so numeric strings count too.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Document {
        &self.0
    }
}
