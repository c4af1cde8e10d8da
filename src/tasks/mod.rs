pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::database::Database;
use crate::engine::types::Options;

/// Trait that all tasks must implement.
#[async_trait]
pub trait Task: Send + Sync {
    /// Task identifier as given on the command line (e.g., "unread_reports").
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Run the task. Errors and panics are caught by the runner and filed as a
    /// failure report.
    async fn run(&self, db: &Database, options: &Options) -> Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("No task named '{0}' is registered")]
    NotFound(String),
}

impl TaskError {
    pub fn variant_name(&self) -> &'static str {
        match self {
            TaskError::NotFound(_) => "NotFound",
        }
    }
}

/// Registry of runnable tasks, keyed by identifier.
pub struct TaskRegistry {
    tasks: HashMap<String, Arc<dyn Task>>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// Create a registry with all built-in tasks registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register a task implementation, replacing any task with the same name.
    pub fn register(&mut self, task: Arc<dyn Task>) {
        self.tasks.insert(task.name().to_string(), task);
    }

    /// Look up a task by identifier.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Task>, TaskError> {
        self.get(name)
            .ok_or_else(|| TaskError::NotFound(name.to_string()))
    }

    /// List all registered tasks with descriptions, sorted by name.
    pub fn list(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .tasks
            .values()
            .map(|t| (t.name(), t.description()))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }
}
