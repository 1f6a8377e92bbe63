//! restic adapter.
//!
//! `restic mount` serves the whole repository from a foreground process, so
//! mounting one snapshot takes three resources: a private directory for the
//! repository mount, the serving process, and a read-only bind mount of
//! `ids/<short id>` onto the session's data directory.

use super::command::ToolCommand;
use super::{path_arg, write_artifact, BackendContext, BackendKind, DestinationBackend, IngestRequest, SourceBackend};
use crate::backup::{Backup, BackupCollection};
use crate::session::mount::{MountHandle, MountResource};
use crate::utils::{ConvertError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info};
use uuid::Uuid;

/// Line printed by `restic mount` once the repository is available
const SERVING_MARKER: &str = "Now serving the repository at ";

#[derive(Debug, Deserialize)]
struct Snapshot {
    id: String,
    #[serde(default)]
    short_id: Option<String>,
    time: String,
}

pub struct ResticBackend {
    context: BackendContext,
}

impl ResticBackend {
    pub fn new(context: BackendContext) -> Self {
        Self { context }
    }

    fn restic(&self) -> ToolCommand {
        ToolCommand::new(&self.context.tools.restic).env(&self.context.env)
    }
}

/// Parse `restic snapshots --json` output.
pub fn parse_snapshots(json: &str) -> Result<BackupCollection> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(json)
        .map_err(|e| ConvertError::Metadata(format!("restic snapshots: {}", e)))?;

    let mut collection = BackupCollection::new();
    for value in raw {
        let snapshot: Snapshot = serde_json::from_value(value.clone())
            .map_err(|e| ConvertError::Metadata(format!("restic snapshot: {}", e)))?;
        let time = DateTime::parse_from_rfc3339(&snapshot.time)
            .map_err(|e| ConvertError::Metadata(format!("restic time '{}': {}", snapshot.time, e)))?
            .with_timezone(&Utc);
        let short_id = snapshot
            .short_id
            .unwrap_or_else(|| snapshot.id.chars().take(8).collect());
        collection.insert(Backup::new(snapshot.id, short_id, time, value))?;
    }
    Ok(collection)
}

/// restic reads `--time` as local wall-clock time.
pub fn render_time<Tz: TimeZone>(time: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.with_timezone(tz).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Arguments of `restic backup` for `request`, with `time` already rendered.
pub fn backup_args(request: &IngestRequest, extra_args: &[String], time: &str) -> Vec<String> {
    let mut args = vec!["backup".to_string()];
    if request.dry_run {
        args.push("--dry-run".to_string());
    }
    args.push("--verbose".to_string());
    args.push("--with-atime".to_string());
    args.push(format!("--tag={}", request.run_id));
    args.push(format!("--time={}", time));
    args.extend(extra_args.iter().cloned());
    args.extend(request.entries.iter().cloned());
    args
}

/// Read at most `attempts` lines from a `restic mount` process until it
/// reports that it is serving. Other lines are logged.
pub async fn wait_until_serving<R>(lines: &mut Lines<R>, attempts: u32, line_timeout: Duration) -> std::result::Result<(), String>
where
    R: AsyncBufRead + Unpin,
{
    for _ in 0..attempts {
        match tokio::time::timeout(line_timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) if line.starts_with(SERVING_MARKER) => return Ok(()),
            Ok(Ok(Some(line))) => info!("{}", line.trim_end()),
            Ok(Ok(None)) => return Err("restic mount exited before serving".to_string()),
            Ok(Err(e)) => return Err(format!("reading restic mount output: {}", e)),
            Err(_) => return Err(format!("no output from restic mount within {:?}", line_timeout)),
        }
    }
    Err(format!("restic mount not serving after {} lines of output", attempts))
}

#[async_trait]
impl SourceBackend for ResticBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Restic
    }

    async fn list(&self) -> Result<BackupCollection> {
        let json = self.restic().args(["snapshots", "--json"]).output_text().await?;
        parse_snapshots(&json)
    }

    async fn mount(&self, backup: &Backup, data_dir: &Path, handle: &mut MountHandle) -> Result<()> {
        let mount_failed = |reason: String| ConvertError::MountAcquisition {
            backup: backup.name.clone(),
            reason,
        };

        let repo_dir = std::env::temp_dir().join(format!("restic-mount-{}", Uuid::new_v4().simple()));
        tokio::fs::create_dir(&repo_dir).await?;
        handle.push(MountResource::Directory { path: repo_dir.clone() });

        info!("Mounting restic repository to {} ...", repo_dir.display());
        let mut child = self
            .restic()
            .arg("mount")
            .args(self.context.extra_args.iter().cloned())
            .arg(path_arg(&repo_dir))
            .spawn_piped()
            .map_err(|e| mount_failed(e.to_string()))?;
        let stdout = child.stdout.take();
        handle.push(MountResource::ServeProcess {
            child,
            mountpoint: repo_dir.clone(),
            stop_timeout: self.context.mount.stop_timeout(),
            grace: self.context.mount.grace(),
        });

        let stdout = stdout.ok_or_else(|| mount_failed("restic mount has no stdout".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();
        wait_until_serving(
            &mut lines,
            self.context.mount.ready_attempts,
            self.context.mount.line_timeout(),
        )
        .await
        .map_err(mount_failed)?;
        info!("Successfully mounted restic repository to {}", repo_dir.display());

        // keep draining so the process never blocks on a full pipe
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("restic mount: {}", line);
            }
        });

        tokio::fs::create_dir_all(data_dir).await?;
        let snapshot_dir = repo_dir.join("ids").join(&backup.name);
        handle.push(MountResource::Mounted {
            mountpoint: data_dir.to_path_buf(),
            unmount: ToolCommand::new(&self.context.tools.umount)
                .env(&self.context.env)
                .arg(path_arg(data_dir)),
            only_if_listed: true,
        });
        ToolCommand::new(&self.context.tools.mount)
            .env(&self.context.env)
            .args(["-o", "bind,ro"])
            .arg(path_arg(&snapshot_dir))
            .arg(path_arg(data_dir))
            .run()
            .await
            .map_err(|e| mount_failed(e.to_string()))?;

        info!("Successfully mounted restic snapshot {} to {}", backup.name, data_dir.display());
        Ok(())
    }

    async fn export_metadata(&self, backup: &Backup, session_dir: &Path) -> Result<Vec<PathBuf>> {
        let text = self.restic().arg("snapshots").arg(&backup.key).output_text().await?;
        let text_path = write_artifact(session_dir, "restic_snapshot.txt", &text).await?;
        info!(
            "Exported restic snapshot info of {} as text file into {}",
            backup.name,
            text_path.display()
        );

        let json = self
            .restic()
            .args(["snapshots", "--json"])
            .arg(&backup.key)
            .output_text()
            .await?;
        let json_path = write_artifact(session_dir, "restic_snapshot.json", &json).await?;
        info!(
            "Exported restic snapshot info of {} as json file into {}",
            backup.name,
            json_path.display()
        );

        Ok(vec![text_path, json_path])
    }
}

#[async_trait]
impl DestinationBackend for ResticBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Restic
    }

    async fn list(&self) -> Result<BackupCollection> {
        SourceBackend::list(self).await
    }

    async fn ingest(&self, request: &IngestRequest) -> Result<ExitStatus> {
        let time = render_time(&request.backup.time, &Local);
        info!(
            "Converting {} from {} into new restic snapshot...",
            request.backup.name, time
        );
        let command = self
            .restic()
            .args(backup_args(request, &self.context.extra_args, &time))
            .current_dir(&request.session_dir);
        info!("  calling: {}", command.display());

        let status = command.status().await?;
        info!("restic finished with exit code: {}", status.code().unwrap_or(-1));
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike};

    const SNAPSHOTS: &str = r#"[
        {
            "time": "2024-03-01T13:00:00.123456789+01:00",
            "tree": "b7c1",
            "paths": ["/home"],
            "hostname": "host",
            "username": "root",
            "tags": ["nightly"],
            "id": "0f3c9a1e5b7d2c4f6a8e0b1d3f5a7c9e0f3c9a1e5b7d2c4f6a8e0b1d3f5a7c9e",
            "short_id": "0f3c9a1e"
        },
        {
            "time": "2024-03-02T12:00:00Z",
            "tree": "c8d2",
            "paths": ["/etc"],
            "hostname": "host",
            "id": "1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8f9a0b1c2d3e4f5a6b7c8d9e0f1a2b"
        }
    ]"#;

    #[test]
    fn test_parse_snapshots() {
        let snapshots = parse_snapshots(SNAPSHOTS).unwrap();
        assert_eq!(snapshots.len(), 2);

        let first = &snapshots.as_slice()[0];
        assert_eq!(first.name, "0f3c9a1e");
        assert!(first.key.starts_with("0f3c9a1e5b7d"));
        assert_eq!(first.time.hour(), 12);
        assert_eq!(first.time.nanosecond(), 123_456_000);
        assert_eq!(first.metadata["tags"][0], "nightly");

        // short id derived when missing
        assert_eq!(snapshots.as_slice()[1].name, "1a2b3c4d");
    }

    #[test]
    fn test_parse_rejects_bad_time() {
        let json = r#"[{"id": "abc", "time": "2024-03-02 12:00"}]"#;
        assert!(matches!(parse_snapshots(json), Err(ConvertError::Metadata(_))));
    }

    #[test]
    fn test_render_time() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(render_time(&time, &Utc), "2024-03-01 12:00:00");
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(render_time(&time, &plus_two), "2024-03-01 14:00:00");
    }

    #[test]
    fn test_backup_args() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let request = IngestRequest {
            backup: Backup::new("host-2024-03-01", "host-2024-03-01", time, serde_json::Value::Null),
            session_dir: PathBuf::from("/tmp/backup-convert-x"),
            entries: vec!["data/home".to_string()],
            run_id: "converted_archive_20240401T101010".to_string(),
            dry_run: false,
        };

        let args = backup_args(&request, &["--host=old".to_string()], "2024-03-01 12:00:00");
        assert_eq!(
            args,
            vec![
                "backup",
                "--verbose",
                "--with-atime",
                "--tag=converted_archive_20240401T101010",
                "--time=2024-03-01 12:00:00",
                "--host=old",
                "data/home",
            ]
        );
    }

    #[tokio::test]
    async fn test_wait_until_serving() {
        let output: &[u8] = b"unable to open cache\nNow serving the repository at /tmp/r\nrest\n";
        let mut lines = BufReader::new(output).lines();
        assert!(wait_until_serving(&mut lines, 5, Duration::from_secs(1)).await.is_ok());
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("rest"));
    }

    #[tokio::test]
    async fn test_wait_until_serving_gives_up() {
        let output: &[u8] = b"a\nb\nc\nNow serving the repository at /tmp/r\n";
        let mut lines = BufReader::new(output).lines();
        let err = wait_until_serving(&mut lines, 3, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.contains("after 3 lines"));

        let mut closed = BufReader::new(&b"only line\n"[..]).lines();
        let err = wait_until_serving(&mut closed, 5, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.contains("exited"));
    }
}
