use anyhow::Result;
use async_trait::async_trait;

use crate::engine::database::Database;
use crate::engine::types::{Document, Options};
use crate::tasks::Task;

const CHECKPOINTS_COLLECTION: &str = "checkpoints";

/// Records a named marker, e.g. the last position a sync job reached.
pub struct CheckpointTask;

#[async_trait]
impl Task for CheckpointTask {
    fn name(&self) -> &str {
        "checkpoint"
    }

    fn description(&self) -> &str {
        "Create or update a named checkpoint document"
    }

    async fn run(&self, db: &Database, options: &Options) -> Result<()> {
        let name = options
            .get_str("name")
            .ok_or_else(|| anyhow::anyhow!("checkpoint requires a 'name' option"))?;
        let value = options
            .get("value")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        let mut criteria = Document::new();
        criteria.insert("name".to_string(), serde_json::json!(name));

        let mut info = Document::new();
        info.insert("value".to_string(), value.clone());
        info.insert("task".to_string(), serde_json::json!(db.source()));

        let document = db
            .get_or_create(CHECKPOINTS_COLLECTION, &criteria, info)
            .await?;

        let mut additional = Document::new();
        additional.insert("checkpoint".to_string(), serde_json::json!(name));
        if let Some(created_at) = document.get("created_at") {
            additional.insert("checkpoint_created_at".to_string(), created_at.clone());
        }

        db.success(format!("Checkpoint '{}' set to {}", name, value), Some(additional))
            .await?;
        Ok(())
    }
}
