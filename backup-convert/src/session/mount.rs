//! Mounted resources held for the backup being converted.
//!
//! A [`MountHandle`] is a stack: resources are pushed in the order they are
//! acquired and released in reverse. A resource is only popped once its
//! release attempt finished, and a failed unmount is remembered on the
//! handle itself, so a release interrupted half-way can simply be run
//! again.

use crate::backend::command::ToolCommand;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, info, warn};

/// One acquired resource
#[derive(Debug)]
pub enum MountResource {
    /// Private working directory of the conversion session
    SessionDir { path: PathBuf },

    /// Empty directory created to serve as a mountpoint
    Directory { path: PathBuf },

    /// Long-running process serving a FUSE mount at `mountpoint`
    ServeProcess {
        child: Child,
        mountpoint: PathBuf,
        stop_timeout: Duration,
        grace: Duration,
    },

    /// Mount released by running `unmount`.
    ///
    /// Pushed before the mount command runs when `only_if_listed` is set:
    /// release then skips `unmount` unless the mount table lists
    /// `mountpoint`.
    Mounted {
        mountpoint: PathBuf,
        unmount: ToolCommand,
        only_if_listed: bool,
    },
}

impl MountResource {
    fn describe(&self) -> String {
        match self {
            MountResource::SessionDir { path } => format!("session directory {}", path.display()),
            MountResource::Directory { path } => format!("directory {}", path.display()),
            MountResource::ServeProcess { mountpoint, child, .. } => format!(
                "mount process {} for {}",
                child.id().map(|p| p.to_string()).unwrap_or_else(|| "(exited)".into()),
                mountpoint.display()
            ),
            MountResource::Mounted { mountpoint, .. } => format!("mount {}", mountpoint.display()),
        }
    }

    fn is_directory(&self) -> bool {
        matches!(self, MountResource::SessionDir { .. } | MountResource::Directory { .. })
    }
}

/// Outcome of releasing a [`MountHandle`]
#[derive(Debug, Default)]
pub struct ReleaseReport {
    /// Resources released successfully
    pub released: Vec<String>,

    /// Resources whose release failed, with the reason
    pub failures: Vec<String>,

    /// Directories left in place because a mount may still be live
    pub kept: Vec<PathBuf>,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.kept.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct MountHandle {
    resources: Vec<MountResource>,
    /// Set once an unmount or process stop failed; never cleared
    mount_may_be_live: bool,
}

impl MountHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resource: MountResource) {
        debug!("Acquired {}", resource.describe());
        self.resources.push(resource);
    }

    /// Release every resource, newest first. Never fails; problems are
    /// logged and collected in the report.
    ///
    /// Once an unmount or process stop has failed, remaining directories are
    /// kept: removing them recursively could reach into a live mount.
    pub async fn release(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        while let Some(resource) = self.resources.last_mut() {
            let description = resource.describe();

            if self.mount_may_be_live && resource.is_directory() {
                if let MountResource::SessionDir { path } | MountResource::Directory { path } = resource {
                    warn!("Keeping {} because a mount below it may still be active", path.display());
                    report.kept.push(path.clone());
                }
                self.resources.pop();
                continue;
            }

            match release_one(resource).await {
                Ok(()) => {
                    debug!("Released {}", description);
                    report.released.push(description);
                }
                Err(reason) => {
                    warn!("Releasing {} failed: {}. Ignoring.", description, reason);
                    if !resource.is_directory() {
                        self.mount_may_be_live = true;
                    }
                    report.failures.push(format!("{}: {}", description, reason));
                }
            }
            self.resources.pop();
        }

        report
    }
}

async fn release_one(resource: &mut MountResource) -> Result<(), String> {
    match resource {
        MountResource::Mounted {
            mountpoint,
            unmount,
            only_if_listed,
        } => {
            if *only_if_listed && !is_mounted(mountpoint).await {
                debug!("{} is not mounted, nothing to unmount", mountpoint.display());
                return Ok(());
            }
            unmount.run().await.map_err(|e| e.to_string())?;
            info!("Unmounted {}", mountpoint.display());
            Ok(())
        }
        MountResource::ServeProcess {
            child,
            mountpoint,
            stop_timeout,
            grace,
        } => {
            stop_serve_process(child, *stop_timeout, *grace).await?;
            info!("Stopped mount process for {}", mountpoint.display());
            Ok(())
        }
        MountResource::Directory { path } => ignore_missing(tokio::fs::remove_dir(&*path).await),
        MountResource::SessionDir { path } => ignore_missing(tokio::fs::remove_dir_all(&*path).await),
    }
}

fn ignore_missing(result: std::io::Result<()>) -> Result<(), String> {
    match result {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.to_string()),
        _ => Ok(()),
    }
}

/// Ask a serve process to unmount with SIGINT, wait up to `stop_timeout`,
/// kill it if it is still running, then give the kernel `grace` to free
/// the FUSE resources.
async fn stop_serve_process(child: &mut Child, stop_timeout: Duration, grace: Duration) -> Result<(), String> {
    let Some(pid) = child.id() else {
        // already reaped
        return Ok(());
    };

    match i32::try_from(pid) {
        Ok(raw) => {
            if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGINT) {
                debug!("SIGINT to mount process {} failed: {}", pid, e);
            }
        }
        Err(_) => warn!("Mount process id {} out of range, killing instead", pid),
    }

    match tokio::time::timeout(stop_timeout, child.wait()).await {
        Ok(Ok(status)) => debug!("Mount process {} exited with {}", pid, status),
        Ok(Err(e)) => return Err(format!("waiting for mount process {}: {}", pid, e)),
        Err(_) => {
            warn!(
                "Mount process {} still running after {:?}, killing it",
                pid, stop_timeout
            );
            child
                .kill()
                .await
                .map_err(|e| format!("killing mount process {}: {}", pid, e))?;
        }
    }

    tokio::time::sleep(grace).await;
    Ok(())
}

/// Whether `mountpoint` appears in a mount table in `/proc/self/mounts`
/// format.
pub fn is_listed(mount_table: &str, mountpoint: &Path) -> bool {
    mount_table.lines().any(|line| {
        line.split_whitespace()
            .nth(1)
            .map(|field| Path::new(&field.replace("\\040", " ")) == mountpoint)
            .unwrap_or(false)
    })
}

/// Whether `mountpoint` is currently mounted. Systems without
/// `/proc/self/mounts` report every mountpoint as mounted.
async fn is_mounted(mountpoint: &Path) -> bool {
    match tokio::fs::read_to_string("/proc/self/mounts").await {
        Ok(table) => is_listed(&table, mountpoint),
        Err(_) => true,
    }
}

/// Poll the mount table until `mountpoint` shows up, at most `attempts`
/// times. Systems without `/proc/self/mounts` are assumed ready.
pub async fn wait_for_mountpoint(mountpoint: &Path, attempts: u32, interval: Duration) -> Result<(), String> {
    for attempt in 1..=attempts.max(1) {
        match tokio::fs::read_to_string("/proc/self/mounts").await {
            Ok(table) if is_listed(&table, mountpoint) => return Ok(()),
            Ok(_) => debug!(
                "{} not mounted yet (check {}/{})",
                mountpoint.display(),
                attempt,
                attempts
            ),
            Err(e) => {
                debug!("Cannot read mount table ({}), assuming {} is ready", e, mountpoint.display());
                return Ok(());
            }
        }
        tokio::time::sleep(interval).await;
    }
    Err(format!(
        "{} did not appear in the mount table after {} checks",
        mountpoint.display(),
        attempts
    ))
}
