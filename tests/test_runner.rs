//! Integration tests for the task runner and its failure boundary.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use taskrunner::engine::database::Database;
use taskrunner::engine::runner::{RunOutcome, TaskRunner};
use taskrunner::engine::types::*;
use taskrunner::storage::DocumentStore;
use taskrunner::storage::memory_store::MemoryDocumentStore;
use taskrunner::tasks::{Task, TaskError, TaskRegistry};

struct SilentTask;

#[async_trait]
impl Task for SilentTask {
    fn name(&self) -> &str {
        "silent"
    }
    fn description(&self) -> &str {
        "Does nothing"
    }
    async fn run(&self, _db: &Database, _options: &Options) -> Result<()> {
        Ok(())
    }
}

struct ChattyTask;

#[async_trait]
impl Task for ChattyTask {
    fn name(&self) -> &str {
        "chatty_task"
    }
    fn description(&self) -> &str {
        "Files two reports"
    }
    async fn run(&self, db: &Database, options: &Options) -> Result<()> {
        let label = options.get_str("label").unwrap_or("none");
        db.note(format!("starting {}", label), None).await?;
        db.success("finished", None).await?;
        Ok(())
    }
}

struct FailingTask;

#[async_trait]
impl Task for FailingTask {
    fn name(&self) -> &str {
        "failing"
    }
    fn description(&self) -> &str {
        "Reports a warning, then errors"
    }
    async fn run(&self, db: &Database, _options: &Options) -> Result<()> {
        db.warning("about to fail", None).await?;
        let body = std::fs::read_to_string("/nonexistent/input.json")
            .map_err(anyhow::Error::from)?;
        db.success(body, None).await?;
        Ok(())
    }
}

struct DividingTask;

#[async_trait]
impl Task for DividingTask {
    fn name(&self) -> &str {
        "divide"
    }
    fn description(&self) -> &str {
        "Divides 100 by the divisor option"
    }
    async fn run(&self, db: &Database, options: &Options) -> Result<()> {
        let divisor = options.get_i64("divisor").unwrap_or(1);
        let quotient = 100 / divisor;
        db.success(format!("quotient {}", quotient), None).await?;
        Ok(())
    }
}

fn registry() -> Arc<TaskRegistry> {
    let mut registry = TaskRegistry::new();
    registry.register(Arc::new(SilentTask));
    registry.register(Arc::new(ChattyTask));
    registry.register(Arc::new(FailingTask));
    registry.register(Arc::new(DividingTask));
    Arc::new(registry)
}

fn setup(task: &str) -> (TaskRunner, Database, Arc<dyn DocumentStore>) {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let db = Database::with_store(task, store.clone());
    (TaskRunner::new(registry()), db, store)
}

async fn reports(store: &Arc<dyn DocumentStore>) -> Vec<Document> {
    store.find(REPORTS_COLLECTION, &Document::new()).await.unwrap()
}

// --- clean completion ---

#[tokio::test]
async fn silent_task_files_no_reports() {
    let (runner, db, store) = setup("silent");

    let outcome = runner.run("silent", &db, &Options::new()).await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert!(reports(&store).await.is_empty());
}

#[tokio::test]
async fn task_reports_are_kept_and_options_reach_the_task() {
    let (runner, db, store) = setup("chatty_task");
    let mut options = Options::new();
    options.insert("label", serde_json::json!("nightly"));

    let outcome = runner.run("chatty_task", &db, &options).await;

    assert!(!outcome.is_failed());
    let docs = reports(&store).await;
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["message"], "starting nightly");
    assert_eq!(docs[0]["source"], "ChattyTask");
    assert_eq!(docs[1]["status"], "SUCCESS");
}

// --- failure boundary ---

#[tokio::test]
async fn unknown_task_files_exactly_one_failure() {
    let (runner, db, store) = setup("no_such_task");

    let outcome = runner.run("no_such_task", &db, &Options::new()).await;

    let failure = match outcome {
        RunOutcome::Failed(f) => f,
        RunOutcome::Completed => panic!("expected failure"),
    };
    assert_eq!(failure.kind, "TaskError::NotFound");

    let docs = reports(&store).await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["status"], "FAILURE");
    assert_eq!(docs[0]["source"], "NoSuchTask");
    assert_eq!(docs[0]["exception"]["type"], "TaskError::NotFound");
    assert!(
        docs[0]["message"]
            .as_str()
            .unwrap()
            .contains("No task named 'no_such_task'")
    );
}

#[tokio::test]
async fn task_error_is_reported_after_task_reports() {
    let (runner, db, store) = setup("failing");

    let outcome = runner.run("failing", &db, &Options::new()).await;
    assert!(outcome.is_failed());

    let docs = reports(&store).await;
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["status"], "WARNING");
    assert_eq!(docs[1]["status"], "FAILURE");
    assert_eq!(docs[1]["exception"]["type"], "std::io::Error");
    assert!(!docs[1]["exception"]["message"].as_str().unwrap().is_empty());
    assert!(!docs[1]["exception"]["backtrace"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn division_by_zero_panic_is_reported() {
    let (runner, db, store) = setup("divide");
    let mut options = Options::new();
    options.insert("divisor", serde_json::json!("0"));

    let outcome = runner.run("divide", &db, &options).await;

    match outcome {
        RunOutcome::Failed(f) => {
            assert_eq!(f.kind, "panic");
            assert!(f.message.contains("divide by zero"));
        }
        RunOutcome::Completed => panic!("expected failure"),
    }

    let docs = reports(&store).await;
    assert_eq!(docs.len(), 1);
    let exception = docs[0]["exception"].as_object().unwrap();
    assert_eq!(exception["type"], "panic");
    assert!(!exception["message"].as_str().unwrap().is_empty());
    let backtrace = exception["backtrace"].as_array().unwrap();
    assert!(!backtrace.is_empty());
    assert!(backtrace.iter().all(|frame| frame.is_string()));
}

#[tokio::test]
async fn runner_keeps_working_after_a_panic() {
    let (runner, db, store) = setup("divide");
    let mut zero = Options::new();
    zero.insert("divisor", serde_json::json!(0));
    let mut four = Options::new();
    four.insert("divisor", serde_json::json!(4));

    assert!(runner.run("divide", &db, &zero).await.is_failed());
    assert_eq!(runner.run("divide", &db, &four).await, RunOutcome::Completed);

    let docs = reports(&store).await;
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[1]["message"], "quotient 25");
}

// --- registry ---

#[test]
fn registry_resolve_unknown_is_not_found() {
    let registry = registry();
    assert!(registry.get("silent").is_some());
    match registry.resolve("nope") {
        Err(TaskError::NotFound(name)) => assert_eq!(name, "nope"),
        Ok(_) => panic!("expected NotFound"),
    }
}

#[test]
fn registry_lists_sorted() {
    let registry = registry();
    let names: Vec<&str> = registry.list().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["chatty_task", "divide", "failing", "silent"]);
}

#[test]
fn registering_same_name_replaces() {
    let mut registry = TaskRegistry::new();
    registry.register(Arc::new(SilentTask));
    registry.register(Arc::new(SilentTask));
    assert_eq!(registry.list().len(), 1);
}
