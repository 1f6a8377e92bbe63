//! In-process stand-ins for the backup tools and the terminal, used by unit
//! tests.

use crate::backend::command::ToolCommand;
use crate::backend::{BackendKind, DestinationBackend, IngestRequest, SourceBackend};
use crate::backup::{Backup, BackupCollection};
use crate::prompt::Prompt;
use crate::session::mount::{MountHandle, MountResource};
use crate::session::ActiveBackupRegistry;
use crate::utils::{ConvertError, Result};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn backup(name: &str) -> Backup {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let offset = name.bytes().map(i64::from).sum::<i64>();
    Backup::new(name, name, base + Duration::minutes(offset), serde_json::Value::Null)
}

pub fn collection(names: &[&str]) -> BackupCollection {
    BackupCollection::try_from(names.iter().map(|n| backup(n)).collect::<Vec<_>>()).unwrap()
}

/// Source whose "mount" is a plain directory tree.
pub struct FakeSource {
    fail_on: Vec<String>,
    hang_on: Option<String>,
    mounts: AtomicUsize,
}

impl FakeSource {
    /// Mounting any backup named in `fail_on` fails.
    pub fn new(fail_on: Vec<&str>) -> Self {
        Self {
            fail_on: fail_on.into_iter().map(String::from).collect(),
            hang_on: None,
            mounts: AtomicUsize::new(0),
        }
    }

    /// Mounting `backup` never finishes once its mount is registered.
    pub fn hanging_on(mut self, backup: &str) -> Self {
        self.hang_on = Some(backup.to_string());
        self
    }

    pub fn mounts(&self) -> usize {
        self.mounts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceBackend for FakeSource {
    fn kind(&self) -> BackendKind {
        BackendKind::Borg
    }

    async fn list(&self) -> Result<BackupCollection> {
        Ok(BackupCollection::new())
    }

    async fn mount(&self, backup: &Backup, data_dir: &Path, handle: &mut MountHandle) -> Result<()> {
        self.mounts.fetch_add(1, Ordering::SeqCst);
        tokio::fs::create_dir(data_dir).await?;

        if self.fail_on.contains(&backup.name) {
            handle.push(MountResource::Directory {
                path: data_dir.to_path_buf(),
            });
            return Err(ConvertError::MountAcquisition {
                backup: backup.name.clone(),
                reason: "fake mount refused".to_string(),
            });
        }

        for dir in ["etc", "home", ".hidden"] {
            tokio::fs::create_dir(data_dir.join(dir)).await?;
        }
        tokio::fs::write(data_dir.join("etc").join("hostname"), &backup.name).await?;
        handle.push(MountResource::Mounted {
            mountpoint: data_dir.to_path_buf(),
            unmount: ToolCommand::new("true"),
            only_if_listed: false,
        });
        if self.hang_on.as_deref() == Some(backup.name.as_str()) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn export_metadata(&self, backup: &Backup, session_dir: &Path) -> Result<Vec<PathBuf>> {
        let path = session_dir.join("info.json");
        tokio::fs::write(&path, serde_json::to_string(&backup.metadata)?).await?;
        Ok(vec![path])
    }
}

/// What [`FakeDestination`] saw for one ingest
#[derive(Debug, Clone)]
pub struct RecordedIngest {
    pub backup: String,
    pub session_dir: PathBuf,
    pub entries: Vec<String>,
    pub run_id: String,
    pub dry_run: bool,
    /// Backup registered while the ingest ran
    pub active: Option<String>,
}

/// Destination that records requests and answers with scripted exit codes.
pub struct FakeDestination {
    registry: ActiveBackupRegistry,
    exit_codes: HashMap<String, i32>,
    hang: bool,
    requests: Mutex<Vec<RecordedIngest>>,
}

impl FakeDestination {
    pub fn new(registry: ActiveBackupRegistry) -> Self {
        Self {
            registry,
            exit_codes: HashMap::new(),
            hang: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_exit_code(mut self, backup: &str, code: i32) -> Self {
        self.exit_codes.insert(backup.to_string(), code);
        self
    }

    /// Every ingest is recorded and then never finishes.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn requests(&self) -> Vec<RecordedIngest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DestinationBackend for FakeDestination {
    fn kind(&self) -> BackendKind {
        BackendKind::Restic
    }

    async fn list(&self) -> Result<BackupCollection> {
        Ok(BackupCollection::new())
    }

    async fn ingest(&self, request: &IngestRequest) -> Result<ExitStatus> {
        let active = self.registry.active_name().await;
        self.requests.lock().unwrap().push(RecordedIngest {
            backup: request.backup.name.clone(),
            session_dir: request.session_dir.clone(),
            entries: request.entries.clone(),
            run_id: request.run_id.clone(),
            dry_run: request.dry_run,
            active,
        });
        if self.hang {
            std::future::pending::<()>().await;
        }
        let code = self.exit_codes.get(&request.backup.name).copied().unwrap_or(0);
        Ok(ExitStatus::from_raw(code << 8))
    }
}

/// Prompt with canned answers.
pub struct ScriptedPrompt {
    range: String,
    confirm: bool,
    pub range_asked: AtomicUsize,
    pub confirm_asked: AtomicUsize,
}

impl ScriptedPrompt {
    pub fn new(range: &str, confirm: bool) -> Self {
        Self {
            range: range.to_string(),
            confirm,
            range_asked: AtomicUsize::new(0),
            confirm_asked: AtomicUsize::new(0),
        }
    }
}

impl Prompt for ScriptedPrompt {
    fn range_expression(&self, _count: usize) -> Result<String> {
        self.range_asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.range.clone())
    }

    fn confirm(&self, _count: usize) -> Result<bool> {
        self.confirm_asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.confirm)
    }
}
