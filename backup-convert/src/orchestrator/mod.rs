//! Drives a batch of backups from source to destination.
//!
//! Backups are converted one after the other. A backup that fails to mount
//! or convert is recorded in the [`BatchReport`] and the batch moves on to
//! the next one.

pub mod progress;

use crate::backend::{DestinationBackend, SourceBackend};
use crate::backup::{range, Backup, BackupCollection};
use crate::prompt::Prompt;
use crate::session::{ActiveBackupRegistry, BackupSession, SessionOptions};
use crate::utils::{ConvertError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone};
use progress::{BackupOutcome, BatchProgress, BatchReport, OutcomeStatus};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Ask the destination tool not to write anything
    pub dry_run: bool,

    /// Skip range prompt and confirmation
    pub assume_yes: bool,

    /// strftime format of the run identifier
    pub run_id_format: String,

    pub session: SessionOptions,
}

pub struct Orchestrator {
    source: Arc<dyn SourceBackend>,
    destination: Arc<dyn DestinationBackend>,
    registry: ActiveBackupRegistry,
    prompt: Arc<dyn Prompt>,
    options: ConvertOptions,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn SourceBackend>,
        destination: Arc<dyn DestinationBackend>,
        registry: ActiveBackupRegistry,
        prompt: Arc<dyn Prompt>,
        options: ConvertOptions,
    ) -> Self {
        Self {
            source,
            destination,
            registry,
            prompt,
            options,
        }
    }

    /// Resolve the backups to convert. Without an expression the operator
    /// is asked, unless prompts are skipped, in which case everything is
    /// selected.
    pub async fn select(&self, expression: Option<&str>, collection: &BackupCollection) -> Result<Vec<Backup>> {
        let expression = match expression {
            Some(expression) => expression.to_string(),
            None if self.options.assume_yes => String::new(),
            None => {
                let prompt = Arc::clone(&self.prompt);
                let count = collection.len();
                blocking(move || prompt.range_expression(count)).await?
            }
        };
        range::resolve(&expression, collection)
    }

    /// Convert `selection` in order and report what happened to each backup.
    ///
    /// Fails only if the operator declines or the run identifier cannot be
    /// generated; per-backup failures end up in the report.
    pub async fn run(&self, selection: &[Backup]) -> Result<BatchReport> {
        if selection.is_empty() {
            info!("No backups selected, nothing to convert");
            return Ok(BatchReport::default());
        }

        for backup in selection {
            info!("Backup {} selected.", backup);
        }

        if !self.options.assume_yes {
            let prompt = Arc::clone(&self.prompt);
            let count = selection.len();
            if !blocking(move || prompt.confirm(count)).await? {
                return Err(ConvertError::Declined);
            }
        }

        let run_id = run_identifier(&self.options.run_id_format, &Local::now())?;
        info!("Run identifier: {}", run_id);

        let mut report = BatchReport::new(run_id.clone());
        let total = selection.len();
        for (i, backup) in selection.iter().enumerate() {
            let progress = BatchProgress::new(i + 1, total);
            info!("Converting {}: {} ...", progress, backup);

            let status = self.convert_one(backup, &run_id).await;
            report.push(BackupOutcome {
                name: backup.name.clone(),
                progress,
                status,
            });
        }

        report.log_summary();
        Ok(report)
    }

    async fn convert_one(&self, backup: &Backup, run_id: &str) -> OutcomeStatus {
        let mut session = BackupSession::new(backup, self.registry.clone());

        let result = match session.prepare(self.source.as_ref(), &self.options.session).await {
            Ok(()) => {
                session
                    .convert(self.destination.as_ref(), run_id, self.options.dry_run)
                    .await
            }
            Err(e) => Err(e),
        };
        session.cleanup().await;

        match result {
            Ok(status) if status.success() => OutcomeStatus::Converted,
            Ok(status) => {
                warn!("Converting {} failed: destination tool exited with {}", backup.name, status);
                OutcomeStatus::BackendFailed { code: status.code() }
            }
            Err(e) => {
                warn!("Converting {} failed: {}", backup.name, e);
                OutcomeStatus::Failed { reason: e.to_string() }
            }
        }
    }
}

/// Render the run identifier for `now`, rejecting malformed formats
/// instead of panicking while formatting.
pub fn run_identifier<Tz>(format: &str, now: &DateTime<Tz>) -> Result<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConvertError::Config(format!("invalid run identifier format '{}'", format)));
    }
    Ok(now.format(format).to_string())
}

/// Run a blocking prompt off the async runtime so signals stay observable.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConvertError::Io(std::io::Error::other(e)))?
}
