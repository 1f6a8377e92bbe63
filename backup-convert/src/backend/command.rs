//! External tool invocations.

use super::env::ToolEnvironment;
use crate::utils::{ConvertError, Result};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// A fully described external command: program, arguments, environment
/// and working directory.
///
/// Kept as data so it can be stored (e.g. as the way to undo a mount) and
/// logged before it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    env: Option<ToolEnvironment>,
    cwd: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: None,
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run with exactly this environment instead of the inherited one.
    pub fn env(mut self, env: &ToolEnvironment) -> Self {
        self.env = Some(env.clone());
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        if let Some(env) = &self.env {
            cmd.env_clear().envs(env.iter());
        }
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> ConvertError {
        ConvertError::Tool {
            program: self.program.clone(),
            reason: format!("could not start: {}", e),
        }
    }

    /// Run with inherited stdio and return the exit status, whatever it is.
    pub async fn status(&self) -> Result<ExitStatus> {
        tracing::debug!("Running: {}", self.display());
        self.command()
            .status()
            .await
            .map_err(|e| self.spawn_error(e))
    }

    /// Run with inherited stdio, failing on a non-zero exit status.
    pub async fn run(&self) -> Result<()> {
        let status = self.status().await?;
        if !status.success() {
            return Err(ConvertError::Tool {
                program: self.program.clone(),
                reason: format!("`{}` exited with {}", self.display(), status),
            });
        }
        Ok(())
    }

    /// Run capturing stdout, failing on a non-zero exit status.
    pub async fn output_text(&self) -> Result<String> {
        tracing::debug!("Running: {}", self.display());
        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(ConvertError::Tool {
                program: self.program.clone(),
                reason: format!(
                    "`{}` exited with {}: {}",
                    self.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Start a long-running process with stdout piped back to the caller.
    ///
    /// The child is not killed on drop; its owner stops it explicitly.
    pub fn spawn_piped(&self) -> Result<Child> {
        tracing::debug!("Spawning: {}", self.display());
        self.command()
            .kill_on_drop(false)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))
    }
}
