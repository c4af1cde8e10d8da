pub mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::{info, warn};

pub use config::{ConfigError, DatabaseConfig, load_options, parse_override};

use crate::engine::database::Database;
use crate::engine::runner::{RunOutcome, TaskRunner};
use crate::tasks::TaskRegistry;

/// Exit code used with `--fail-on-error` when the task failed.
pub const TASK_FAILED_EXIT_CODE: i32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "runner",
    version,
    about = "Run a maintenance task and record its outcome as reports"
)]
pub struct Cli {
    /// Task identifier, e.g. `unread_reports`
    #[arg(required_unless_present = "list_tasks")]
    pub task: Option<String>,

    /// Option overrides as key=value (`True`/`False` become booleans)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub overrides: Vec<String>,

    /// Base options file
    #[arg(long, default_value = config::DEFAULT_OPTIONS_PATH, env = "RUNNER_CONFIG")]
    pub config: PathBuf,

    /// Database connection file
    #[arg(long, default_value = config::DEFAULT_DATABASE_PATH, env = "RUNNER_DATABASE_CONFIG")]
    pub database_config: PathBuf,

    /// Network timeout in seconds for database operations (default: 10)
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long)]
    pub dotenv: Option<PathBuf>,

    /// Exit with code 2 when the task fails (the failure is still reported)
    #[arg(long)]
    pub fail_on_error: bool,

    /// List available tasks and exit
    #[arg(long)]
    pub list_tasks: bool,
}

pub async fn run_cli() -> Result<i32> {
    let cli = Cli::parse();

    load_dotenv(cli.dotenv.as_deref());

    let fail_on_error = cli.fail_on_error;
    let outcome = execute(cli, Arc::new(TaskRegistry::with_builtins())).await?;

    Ok(match outcome {
        Some(outcome) if outcome.is_failed() && fail_on_error => TASK_FAILED_EXIT_CODE,
        _ => 0,
    })
}

/// Load environment variables from a .env file.
/// An explicit path that fails to load is a warning; a missing auto-detected
/// .env is silently skipped.
fn load_dotenv(explicit_path: Option<&Path>) {
    let loaded = match explicit_path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };

    match loaded {
        Ok(path) => info!("Loaded env from {}", path.display()),
        Err(dotenvy::Error::Io(_)) if explicit_path.is_none() => {}
        Err(e) => warn!(error = %e, "Failed to load .env file"),
    }
}

/// Configure, connect, then run the task behind the failure boundary.
///
/// Errors returned from here happened before a database handle existed and
/// could not be reported. Returns `None` when only listing tasks.
pub async fn execute(cli: Cli, registry: Arc<TaskRegistry>) -> Result<Option<RunOutcome>> {
    if cli.list_tasks {
        cmd_list_tasks(&registry);
        return Ok(None);
    }

    let task = cli
        .task
        .ok_or_else(|| anyhow::anyhow!("A task identifier is required"))?;

    // Configure
    let mut options = load_options(&cli.config)?;
    options.apply_overrides(cli.overrides.as_slice())?;
    info!(config = %cli.config.display(), options = options.len(), "Loaded task options");

    let db_config = DatabaseConfig::load(&cli.database_config)?;
    let host = db_config.host()?;
    let database = db_config.database()?;
    let connect_options = db_config.connect_options(cli.timeout);

    // Connect
    let db = Database::open(&task, host, database, &connect_options)
        .await
        .with_context(|| format!("Failed to open database '{}' on '{}'", database, host))?;

    // Resolve + invoke
    let runner = TaskRunner::new(registry);
    Ok(Some(runner.run(&task, &db, &options).await))
}

fn cmd_list_tasks(registry: &TaskRegistry) {
    let tasks = registry.list();

    println!("{:<20} DESCRIPTION", "TASK");
    println!("{}", "-".repeat(60));

    for (name, desc) in &tasks {
        println!("{:<20} {}", name, desc);
    }

    println!("\nTotal: {} task(s)", tasks.len());
}
