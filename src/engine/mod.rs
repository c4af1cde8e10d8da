pub mod database;
pub mod failure;
pub mod runner;
pub mod types;

pub use database::Database;
pub use runner::{RunOutcome, TaskRunner};
