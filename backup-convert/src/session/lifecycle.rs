//! Lifecycle of one backup's conversion.
//!
//! ```text
//! Idle --prepare--> Prepared --convert--> Converted --cleanup--> CleanedUp
//!                       |                     |
//!                       +------ signal -------+--> Aborted
//! ```
//!
//! `cleanup` is valid from any state and never fails, so callers run it
//! unconditionally once `prepare` was attempted.

use super::mount::{MountResource, ReleaseReport};
use super::registry::ActiveBackupRegistry;
use crate::backend::{DestinationBackend, IngestRequest, SourceBackend};
use crate::backup::Backup;
use crate::utils::{ConvertError, Result};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tracing::{info, warn};
use uuid::Uuid;

/// Directory under the session directory where the backup is mounted
pub const DATA_DIR: &str = "data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Prepared,
    Converted,
    CleanedUp,
    Aborted,
}

/// Where session directories are created
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub temp_root: PathBuf,
    pub temp_prefix: String,
}

impl SessionOptions {
    pub fn new(temp_prefix: impl Into<String>) -> Self {
        Self {
            temp_root: std::env::temp_dir(),
            temp_prefix: temp_prefix.into(),
        }
    }
}

/// Drives one backup through prepare, convert and cleanup.
pub struct BackupSession<'a> {
    backup: &'a Backup,
    registry: ActiveBackupRegistry,
    state: LifecycleState,
    session_dir: Option<PathBuf>,
}

impl<'a> BackupSession<'a> {
    pub fn new(backup: &'a Backup, registry: ActiveBackupRegistry) -> Self {
        Self {
            backup,
            registry,
            state: LifecycleState::Idle,
            session_dir: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn session_dir(&self) -> Option<&Path> {
        self.session_dir.as_deref()
    }

    /// Register the backup, create its session directory, mount it and
    /// export its metadata.
    ///
    /// A failed mount releases everything acquired so far before the error
    /// is returned. A failed metadata export leaves the backup mounted and
    /// registered; `cleanup` releases it.
    pub async fn prepare(&mut self, source: &dyn SourceBackend, options: &SessionOptions) -> Result<()> {
        if self.state != LifecycleState::Idle {
            return Err(ConvertError::Lifecycle(format!(
                "prepare of {} in state {:?}",
                self.backup.name, self.state
            )));
        }

        let dir = options
            .temp_root
            .join(format!("{}{}", options.temp_prefix, Uuid::new_v4().simple()));

        let mounted = {
            let mut active = self.registry.activate(&self.backup.name).await?;
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => {
                    active.handle.push(MountResource::SessionDir { path: dir.clone() });
                    self.session_dir = Some(dir.clone());
                    source
                        .mount(self.backup, &dir.join(DATA_DIR), &mut active.handle)
                        .await
                }
                Err(e) => Err(e.into()),
            }
        };

        if let Err(e) = mounted {
            warn!("Preparing {} failed: {}", self.backup.name, e);
            self.release().await;
            return Err(match e {
                ConvertError::MountAcquisition { .. } => e,
                other => ConvertError::MountAcquisition {
                    backup: self.backup.name.clone(),
                    reason: other.to_string(),
                },
            });
        }

        self.transition(LifecycleState::Prepared).await;
        source.export_metadata(self.backup, &dir).await?;
        Ok(())
    }

    /// Ingest the mounted view into the destination.
    ///
    /// A non-zero exit status is returned, not raised.
    pub async fn convert(
        &mut self,
        destination: &dyn DestinationBackend,
        run_id: &str,
        dry_run: bool,
    ) -> Result<ExitStatus> {
        let dir = match (self.state, &self.session_dir) {
            (LifecycleState::Prepared, Some(dir)) => dir.clone(),
            _ => {
                return Err(ConvertError::Lifecycle(format!(
                    "convert of {} in state {:?}",
                    self.backup.name, self.state
                )))
            }
        };

        let entries = top_level_entries(&dir.join(DATA_DIR)).await?;
        let request = IngestRequest {
            backup: self.backup.clone(),
            session_dir: dir,
            entries,
            run_id: run_id.to_string(),
            dry_run,
        };

        let status = destination.ingest(&request).await?;
        self.transition(LifecycleState::Converted).await;
        Ok(status)
    }

    /// Unmount, stop helper processes, remove the session directory and
    /// clear the registration. Never fails.
    pub async fn cleanup(&mut self) -> ReleaseReport {
        match self.state {
            LifecycleState::Idle | LifecycleState::CleanedUp | LifecycleState::Aborted => {
                ReleaseReport::default()
            }
            LifecycleState::Prepared | LifecycleState::Converted => self.release().await,
        }
    }

    async fn release(&mut self) -> ReleaseReport {
        let report = match self.registry.release_if(&self.backup.name).await {
            Some(released) => released.report,
            None => {
                // the interrupt handler got there first
                self.state = LifecycleState::Aborted;
                return ReleaseReport::default();
            }
        };

        if report.is_clean() {
            info!("Cleaned up after {}", self.backup.name);
        } else {
            warn!(
                "Cleanup after {} incomplete ({} failures, kept: {:?})",
                self.backup.name,
                report.failures.len(),
                report.kept
            );
        }
        self.state = LifecycleState::CleanedUp;
        report
    }

    async fn transition(&mut self, state: LifecycleState) {
        self.state = state;
        self.registry.set_state(&self.backup.name, state).await;
    }
}

/// Every entry directly under `dir`, as sorted paths relative to its
/// parent (`data/<name>`).
async fn top_level_entries(dir: &Path) -> Result<Vec<String>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        entries.push(format!("{}/{}", DATA_DIR, entry.file_name().to_string_lossy()));
    }
    entries.sort();
    Ok(entries)
}
