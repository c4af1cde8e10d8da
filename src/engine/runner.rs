use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{error, info};

use crate::engine::database::Database;
use crate::engine::failure::{Failure, install_panic_hook};
use crate::engine::types::Options;
use crate::tasks::TaskRegistry;

/// How a task invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The task returned normally. Any reports it filed are already stored.
    Completed,
    /// Resolution or execution failed; one failure report was filed for it.
    Failed(Failure),
}

impl RunOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }
}

/// Resolves a task by name and runs it behind the failure boundary.
pub struct TaskRunner {
    registry: Arc<TaskRegistry>,
}

impl TaskRunner {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        install_panic_hook();
        Self { registry }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Resolve `task` and run it with `db` and `options`.
    ///
    /// Never fails: an unknown task, an error returned by the task or a panic
    /// inside it is filed as exactly one failure report through `db`.
    pub async fn run(&self, task: &str, db: &Database, options: &Options) -> RunOutcome {
        let failure = match self.registry.resolve(task) {
            Err(e) => Failure::from_error(&anyhow::Error::new(e)),
            Ok(unit) => {
                info!(task = %task, source = %db.source(), "Running task");
                match AssertUnwindSafe(unit.run(db, options)).catch_unwind().await {
                    Ok(Ok(())) => {
                        info!(task = %task, "Task completed");
                        return RunOutcome::Completed;
                    }
                    Ok(Err(e)) => Failure::from_error(&e),
                    Err(panic_payload) => Failure::from_panic(panic_payload),
                }
            }
        };

        error!(
            task = %task,
            kind = %failure.kind,
            error = %failure.message,
            "Task failed"
        );

        if let Err(e) = db.failure(failure.clone(), None).await {
            let reason = format!("{:#}", e);
            error!(task = %task, error = %reason, "Failed to file failure report");
        }

        RunOutcome::Failed(failure)
    }
}
