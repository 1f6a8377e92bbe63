//! Backup Converter Library
//!
//! Converts backups between borg and restic repositories: each selected
//! backup is mounted read-only from the source and re-ingested into the
//! destination with its original timestamp.

pub mod backend;
pub mod backup;
pub mod cli;
pub mod config;
pub mod interrupt;
pub mod orchestrator;
pub mod prompt;
pub mod session;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::Config;
pub use utils::{ConvertError, Result};
