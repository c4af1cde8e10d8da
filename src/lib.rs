//! Maintenance task runner.
//!
//! A run loads options, opens a database handle named after the task, resolves
//! the task from a registry and invokes it. Whatever the task reports, and any
//! error or panic it raises, ends up as documents in the `reports` collection.

pub mod cli;
pub mod engine;
pub mod storage;
pub mod tasks;
