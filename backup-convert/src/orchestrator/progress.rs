//! Batch progress and the per-backup outcome report.

use std::fmt;
use tracing::{info, warn};

/// Position of a backup within the batch, shown as `k of N`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// 1-based position
    pub position: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn new(position: usize, total: usize) -> Self {
        Self { position, total }
    }
}

impl fmt::Display for BatchProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.position, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// The destination tool exited successfully
    Converted,

    /// The destination tool ran but exited non-zero (`None` when killed by
    /// a signal)
    BackendFailed { code: Option<i32> },

    /// Preparing or converting failed before the destination tool finished
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub name: String,
    pub progress: BatchProgress,
    pub status: OutcomeStatus,
}

impl BackupOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Converted
    }
}

/// Everything that happened in one run
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Identifier tagged onto every converted backup; unset when nothing
    /// was converted
    pub run_id: Option<String>,
    pub outcomes: Vec<BackupOutcome>,
}

impl BatchReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: BackupOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn log_summary(&self) {
        let total = self.outcomes.len();
        let failed = self.failed_count();
        info!(
            "Converted {} of {} backups (run {})",
            total - failed,
            total,
            self.run_id.as_deref().unwrap_or("-")
        );

        for outcome in self.outcomes.iter().filter(|o| !o.is_success()) {
            match &outcome.status {
                OutcomeStatus::BackendFailed { code: Some(code) } => {
                    warn!("  {} ({}): destination tool exited with {}", outcome.name, outcome.progress, code)
                }
                OutcomeStatus::BackendFailed { code: None } => {
                    warn!("  {} ({}): destination tool was killed", outcome.name, outcome.progress)
                }
                OutcomeStatus::Failed { reason } => {
                    warn!("  {} ({}): {}", outcome.name, outcome.progress, reason)
                }
                OutcomeStatus::Converted => {}
            }
        }
    }
}
