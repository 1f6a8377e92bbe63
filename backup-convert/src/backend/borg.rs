//! borg adapter.
//!
//! The repository is taken from `BORG_REPO` in the side's environment, so
//! archives are addressed as `::NAME`.

use super::command::ToolCommand;
use super::{path_arg, write_artifact, BackendContext, BackendKind, DestinationBackend, IngestRequest, SourceBackend};
use crate::backup::{Backup, BackupCollection};
use crate::session::mount::{wait_for_mountpoint, MountHandle, MountResource};
use crate::utils::{ConvertError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tracing::info;

#[derive(Debug, Deserialize)]
struct ArchiveList {
    archives: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Archive {
    name: String,
    time: String,
}

pub struct BorgBackend {
    context: BackendContext,
}

impl BorgBackend {
    pub fn new(context: BackendContext) -> Self {
        Self { context }
    }

    fn borg(&self) -> ToolCommand {
        ToolCommand::new(&self.context.tools.borg).env(&self.context.env)
    }
}

/// Parse `borg list --json` output. Archive times are naive local times.
pub fn parse_archives(json: &str) -> Result<BackupCollection> {
    parse_archives_in(json, &Local)
}

/// Parse `borg list --json` output, reading naive times in `tz`.
pub fn parse_archives_in<Tz: TimeZone>(json: &str, tz: &Tz) -> Result<BackupCollection> {
    let list: ArchiveList = serde_json::from_str(json)
        .map_err(|e| ConvertError::Metadata(format!("borg list: {}", e)))?;

    let mut collection = BackupCollection::new();
    for raw in list.archives {
        let archive: Archive = serde_json::from_value(raw.clone())
            .map_err(|e| ConvertError::Metadata(format!("borg archive: {}", e)))?;
        let time = parse_time(&archive.time, tz)?;
        collection.insert(Backup::new(archive.name.clone(), archive.name, time, raw))?;
    }
    Ok(collection)
}

/// borg 1.x prints `2024-03-01T12:00:00.123456` in local time; newer
/// versions may include an offset.
fn parse_time<Tz: TimeZone>(text: &str, tz: &Tz) -> Result<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Ok(time.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| ConvertError::Metadata(format!("borg time '{}': {}", text, e)))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|time| time.with_timezone(&Utc))
        .ok_or_else(|| ConvertError::Metadata(format!("borg time '{}' does not exist locally", text)))
}

/// Arguments of `borg create` for `request`.
pub fn create_args(request: &IngestRequest, extra_args: &[String]) -> Vec<String> {
    let mut args = vec!["create".to_string()];
    if request.dry_run {
        args.push("--dry-run".to_string());
    }
    args.push("--stats".to_string());
    args.push("--verbose".to_string());
    args.push(format!("--comment={}", request.run_id));
    args.push(format!(
        "--timestamp={}",
        request.backup.time.format("%Y-%m-%dT%H:%M:%S+00:00")
    ));
    args.extend(extra_args.iter().cloned());
    args.push(format!("::{}", request.backup.name));
    args.extend(request.entries.iter().cloned());
    args
}

#[async_trait]
impl SourceBackend for BorgBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Borg
    }

    async fn list(&self) -> Result<BackupCollection> {
        let json = self.borg().args(["list", "--json"]).output_text().await?;
        parse_archives(&json)
    }

    async fn mount(&self, backup: &Backup, data_dir: &Path, handle: &mut MountHandle) -> Result<()> {
        tokio::fs::create_dir_all(data_dir).await?;
        info!("Mounting borg archive ::{} to {} ...", backup.name, data_dir.display());

        let mount_failed = |reason: String| ConvertError::MountAcquisition {
            backup: backup.name.clone(),
            reason,
        };

        // registered first: borg may have mounted by the time it is killed
        handle.push(MountResource::Mounted {
            mountpoint: data_dir.to_path_buf(),
            unmount: self.borg().arg("umount").arg(path_arg(data_dir)),
            only_if_listed: true,
        });

        self.borg()
            .arg("mount")
            .args(self.context.extra_args.iter().cloned())
            .arg(format!("::{}", backup.name))
            .arg(path_arg(data_dir))
            .run()
            .await
            .map_err(|e| mount_failed(e.to_string()))?;

        wait_for_mountpoint(
            data_dir,
            self.context.mount.ready_attempts,
            self.context.mount.poll_interval(),
        )
        .await
        .map_err(mount_failed)?;

        info!("Successfully mounted borg archive ::{} to {}", backup.name, data_dir.display());
        Ok(())
    }

    async fn export_metadata(&self, backup: &Backup, session_dir: &Path) -> Result<Vec<PathBuf>> {
        let archive = format!("::{}", backup.name);

        let text = self.borg().arg("info").arg(&archive).output_text().await?;
        let text_path = write_artifact(session_dir, "borg_info_archive.txt", &text).await?;
        info!("Exported borg archive info as text file into {}", text_path.display());

        let json = self.borg().args(["info", "--json"]).arg(&archive).output_text().await?;
        let json_path = write_artifact(session_dir, "borg_info_archive.json", &json).await?;
        info!("Exported borg archive info as json file into {}", json_path.display());

        Ok(vec![text_path, json_path])
    }
}

#[async_trait]
impl DestinationBackend for BorgBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Borg
    }

    async fn list(&self) -> Result<BackupCollection> {
        SourceBackend::list(self).await
    }

    async fn ingest(&self, request: &IngestRequest) -> Result<ExitStatus> {
        info!(
            "Converting {} from {} into new borg archive...",
            request.backup.name,
            request.backup.time.format("%Y-%m-%dT%H:%M:%S")
        );
        let command = self
            .borg()
            .args(create_args(request, &self.context.extra_args))
            .current_dir(&request.session_dir);
        info!("  calling: {}", command.display());

        let status = command.status().await?;
        info!("borg finished with exit code: {}", status.code().unwrap_or(-1));
        Ok(status)
    }
}
