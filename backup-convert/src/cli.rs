//! Command-line interface.
//!
//! Arguments after `--` are handed to the backup tools. A second `--`
//! separates source tool arguments (before) from destination tool
//! arguments (after):
//!
//! ```text
//! backup-convert borg2restic -y -- --remote-path=borg-1.2 -- --compression max
//! ```

use crate::backend::BackendKind;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Convert backups between borg and restic repositories", long_about = None)]
pub struct Args {
    /// Source and destination tool
    #[arg(value_enum)]
    pub mode: Mode,

    /// Ask the destination tool not to write anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Do not prompt; without --backup-range every backup is converted
    #[arg(short = 'y', long)]
    pub assume_yes: bool,

    /// Backups to convert: 3, -7, 21-23, 42- or all
    #[arg(short, long, value_name = "RANGE", allow_hyphen_values = true)]
    pub backup_range: Option<String>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Arguments for the backup tools
    #[arg(last = true, allow_hyphen_values = true, value_name = "TOOL_ARGS")]
    pub tool_args: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[value(name = "borg2restic")]
    BorgToRestic,
    #[value(name = "restic2borg")]
    ResticToBorg,
    #[value(name = "restic2restic")]
    ResticToRestic,
    #[value(name = "borg2borg")]
    BorgToBorg,
}

impl Mode {
    /// Source and destination backend
    pub fn backends(self) -> (BackendKind, BackendKind) {
        match self {
            Mode::BorgToRestic => (BackendKind::Borg, BackendKind::Restic),
            Mode::ResticToBorg => (BackendKind::Restic, BackendKind::Borg),
            Mode::ResticToRestic => (BackendKind::Restic, BackendKind::Restic),
            Mode::BorgToBorg => (BackendKind::Borg, BackendKind::Borg),
        }
    }
}

/// Pass-through arguments per side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolArgs {
    pub source: Vec<String>,
    pub destination: Vec<String>,
}

impl Args {
    pub fn split_tool_args(&self) -> ToolArgs {
        split_tool_args(&self.tool_args)
    }
}

/// Split the arguments that followed the first `--`.
pub fn split_tool_args(args: &[String]) -> ToolArgs {
    match args.iter().position(|a| a == "--") {
        Some(i) => ToolArgs {
            source: args[..i].to_vec(),
            destination: args[i + 1..].to_vec(),
        },
        None => ToolArgs {
            source: Vec::new(),
            destination: args.to_vec(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv.iter().copied()).unwrap()
    }

    fn split(argv: &[&str]) -> (Vec<String>, Vec<String>) {
        let args = parse(argv).split_tool_args();
        (args.source, args.destination)
    }

    #[test]
    fn test_rejects_bad_invocations() {
        assert!(Args::try_parse_from(["backup-convert"]).is_err());
        assert!(Args::try_parse_from(["backup-convert", "invalid"]).is_err());
        assert!(Args::try_parse_from(["backup-convert", "restic2restic", "--foobar"]).is_err());
    }

    #[test]
    fn test_flags() {
        let args = parse(&["backup-convert", "borg2restic", "-n", "-y", "-b", "2-4", "-l", "debug"]);
        assert_eq!(args.mode, Mode::BorgToRestic);
        assert!(args.dry_run);
        assert!(args.assume_yes);
        assert_eq!(args.backup_range.as_deref(), Some("2-4"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.mode.backends(), (BackendKind::Borg, BackendKind::Restic));

        let args = parse(&["backup-convert", "restic2borg", "--backup-range", "-7"]);
        assert_eq!(args.backup_range.as_deref(), Some("-7"));
        assert!(!args.dry_run);
        assert_eq!(args.mode.backends(), (BackendKind::Restic, BackendKind::Borg));
    }

    #[test]
    fn test_tool_args_split() {
        let none: Vec<String> = Vec::new();

        assert_eq!(split(&["backup-convert", "restic2restic"]), (none.clone(), none.clone()));
        assert_eq!(
            split(&["backup-convert", "restic2restic", "--", "--foo"]),
            (none.clone(), vec!["--foo".to_string()])
        );
        assert_eq!(
            split(&["backup-convert", "restic2restic", "--", "--foo", "--"]),
            (vec!["--foo".to_string()], none.clone())
        );
        assert_eq!(
            split(&["backup-convert", "restic2restic", "--", "--"]),
            (none.clone(), none.clone())
        );
        assert_eq!(
            split(&["backup-convert", "restic2restic", "--", "--", "--bar"]),
            (none.clone(), vec!["--bar".to_string()])
        );
        assert_eq!(
            split(&["backup-convert", "restic2restic", "--", "--foo", "--", "--bar"]),
            (vec!["--foo".to_string()], vec!["--bar".to_string()])
        );
    }
}
