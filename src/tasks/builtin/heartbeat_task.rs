use anyhow::Result;
use async_trait::async_trait;

use crate::engine::database::Database;
use crate::engine::types::{Document, Options, timestamp};
use crate::tasks::Task;

pub struct HeartbeatTask;

#[async_trait]
impl Task for HeartbeatTask {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn description(&self) -> &str {
        "File a note showing the runner can reach the database"
    }

    async fn run(&self, db: &Database, options: &Options) -> Result<()> {
        let message = options.get_str("message").unwrap_or("Task runner is alive");

        let mut additional = Document::new();
        additional.insert("started_at".to_string(), timestamp());

        tracing::info!("{}", message);
        db.note(message, Some(additional)).await?;
        Ok(())
    }
}
