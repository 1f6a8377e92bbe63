//! Configuration management for the backup converter.
//!
//! Loads configuration from an optional TOML file with environment variable
//! overrides. Every field has a default, so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub tools: ToolsConfig,
    pub mount: MountConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// borg binary
    #[serde(default = "default_borg")]
    pub borg: String,

    /// restic binary
    #[serde(default = "default_restic")]
    pub restic: String,

    /// mount(8), used for read-only bind mounts
    #[serde(default = "default_mount")]
    pub mount: String,

    /// umount(8)
    #[serde(default = "default_umount")]
    pub umount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Readiness checks before a mount counts as failed
    #[serde(default = "default_ready_attempts")]
    pub ready_attempts: u32,

    /// Delay between polls of the mount table
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum wait for one line of output from a serve process
    #[serde(default = "default_line_timeout_secs")]
    pub line_timeout_secs: u64,

    /// Wait for a serve process to exit after SIGINT before killing it
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    /// Pause after a serve process exits, before its directory is removed
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Prefix of per-backup working directories under the temp dir
    #[serde(default = "default_temp_prefix")]
    pub temp_prefix: String,

    /// Prefix of variables split into source/destination tool environments
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,

    /// strftime format of the run identifier
    #[serde(default = "default_run_id_format")]
    pub run_id_format: String,
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_borg() -> String {
    "borg".to_string()
}

fn default_restic() -> String {
    "restic".to_string()
}

fn default_mount() -> String {
    "mount".to_string()
}

fn default_umount() -> String {
    "umount".to_string()
}

fn default_ready_attempts() -> u32 {
    5
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_line_timeout_secs() -> u64 {
    60
}

fn default_stop_timeout_secs() -> u64 {
    15
}

fn default_grace_secs() -> u64 {
    2
}

fn default_temp_prefix() -> String {
    "backup-convert-".to_string()
}

fn default_env_prefix() -> String {
    "BACKUP_CONVERT_".to_string()
}

fn default_run_id_format() -> String {
    "converted_archive_%Y%m%dT%H%M%S".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            borg: default_borg(),
            restic: default_restic(),
            mount: default_mount(),
            umount: default_umount(),
        }
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            ready_attempts: default_ready_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            line_timeout_secs: default_line_timeout_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
            grace_secs: default_grace_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            temp_prefix: default_temp_prefix(),
            env_prefix: default_env_prefix(),
            run_id_format: default_run_id_format(),
        }
    }
}

impl MountConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn line_timeout(&self) -> Duration {
        Duration::from_secs(self.line_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply `<env_prefix>BORG_BIN`, `<env_prefix>RESTIC_BIN` and
    /// `<env_prefix>LOG_LEVEL` from the given variables.
    pub fn apply_env_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = self.session.env_prefix.clone();
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(&prefix) else {
                continue;
            };
            match name {
                "BORG_BIN" => self.tools.borg = value,
                "RESTIC_BIN" => self.tools.restic = value,
                "LOG_LEVEL" => self.log.level = value,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.tools.borg, "borg");
        assert_eq!(config.mount.ready_attempts, 5);
        assert_eq!(config.mount.stop_timeout(), Duration::from_secs(15));
        assert_eq!(config.mount.grace(), Duration::from_secs(2));
        assert_eq!(config.session.temp_prefix, "backup-convert-");
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "[tools]\nrestic = \"/opt/restic/bin/restic\"\n\n[mount]\nready_attempts = 9")?;
        file.flush()?;

        let config = Config::from_file(file.path())?;
        assert_eq!(config.tools.restic, "/opt/restic/bin/restic");
        assert_eq!(config.tools.borg, "borg");
        assert_eq!(config.mount.ready_attempts, 9);
        assert_eq!(config.mount.grace_secs, 2);
        assert_eq!(config.log.level, "info");

        Ok(())
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(vec![
            ("BACKUP_CONVERT_BORG_BIN".to_string(), "borg2".to_string()),
            ("BACKUP_CONVERT_LOG_LEVEL".to_string(), "debug".to_string()),
            ("BACKUP_CONVERT_SRC_BORG_REPO".to_string(), "/srv/borg".to_string()),
            ("BORG_BIN".to_string(), "ignored".to_string()),
        ]);

        assert_eq!(config.tools.borg, "borg2");
        assert_eq!(config.tools.restic, "restic");
        assert_eq!(config.log.level, "debug");
    }
}
