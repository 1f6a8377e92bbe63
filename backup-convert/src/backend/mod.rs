//! Adapters for the external backup tools.
//!
//! The converter only talks to repositories through [`SourceBackend`] and
//! [`DestinationBackend`]; everything tool specific (command lines, JSON
//! shapes, time formats) stays in the adapter modules.

pub mod borg;
pub mod command;
pub mod env;
pub mod restic;

use crate::backup::{Backup, BackupCollection};
use crate::config::{Config, MountConfig, ToolsConfig};
use crate::session::mount::MountHandle;
use crate::utils::Result;
use async_trait::async_trait;
use env::{Side, ToolEnvironment};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

/// Supported backup tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Borg,
    Restic,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Borg => write!(f, "borg"),
            BackendKind::Restic => write!(f, "restic"),
        }
    }
}

/// Everything an adapter needs to build its command lines
#[derive(Debug, Clone)]
pub struct BackendContext {
    pub tools: ToolsConfig,
    pub mount: MountConfig,
    pub env: ToolEnvironment,
    /// Arguments passed through from the command line
    pub extra_args: Vec<String>,
}

impl BackendContext {
    /// Context for one side, with its environment view taken from the
    /// current process.
    pub fn new(config: &Config, side: Side, extra_args: Vec<String>) -> Self {
        Self {
            tools: config.tools.clone(),
            mount: config.mount.clone(),
            env: ToolEnvironment::from_process(&config.session.env_prefix, side),
            extra_args,
        }
    }
}

/// A request to write one converted backup into the destination
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// The source backup being converted
    pub backup: Backup,

    /// Session directory; entries are relative to it
    pub session_dir: PathBuf,

    /// Top-level entries of the mounted view, e.g. `data/home`
    pub entries: Vec<String>,

    /// Identifier shared by every backup converted in this run
    pub run_id: String,

    /// Ask the tool not to modify the repository
    pub dry_run: bool,
}

/// Repository that backups are read from
#[async_trait]
pub trait SourceBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// List backups in repository order.
    async fn list(&self) -> Result<BackupCollection>;

    /// Expose `backup` read-only at `data_dir`, pushing every acquired
    /// resource onto `handle` as soon as it exists.
    async fn mount(&self, backup: &Backup, data_dir: &Path, handle: &mut MountHandle) -> Result<()>;

    /// Write a machine-readable and a human-readable description of
    /// `backup` into `session_dir`, returning the written files.
    async fn export_metadata(&self, backup: &Backup, session_dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Repository that converted backups are written to
#[async_trait]
pub trait DestinationBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// List backups already present.
    async fn list(&self) -> Result<BackupCollection>;

    /// Create a new backup from the request's entries and return the tool's
    /// exit status.
    async fn ingest(&self, request: &IngestRequest) -> Result<ExitStatus>;
}

pub fn source(kind: BackendKind, context: BackendContext) -> Arc<dyn SourceBackend> {
    match kind {
        BackendKind::Borg => Arc::new(borg::BorgBackend::new(context)),
        BackendKind::Restic => Arc::new(restic::ResticBackend::new(context)),
    }
}

pub fn destination(kind: BackendKind, context: BackendContext) -> Arc<dyn DestinationBackend> {
    match kind {
        BackendKind::Borg => Arc::new(borg::BorgBackend::new(context)),
        BackendKind::Restic => Arc::new(restic::ResticBackend::new(context)),
    }
}

/// Render a path as a command-line argument.
pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Write `content` to `session_dir/file_name`.
pub(crate) async fn write_artifact(session_dir: &Path, file_name: &str, content: &str) -> Result<PathBuf> {
    let path = session_dir.join(file_name);
    tokio::fs::write(&path, content).await?;
    Ok(path)
}
