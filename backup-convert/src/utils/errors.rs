//! Custom error types for the backup converter.

use thiserror::Error;

/// Exit status used when the operator declined or a batch had failures.
pub const EXIT_FAILURE: i32 = 1;

/// Exit status for invalid command-line input such as a bad range.
pub const EXIT_USAGE: i32 = 2;

/// Exit status after an operator interrupt (128 + SIGINT).
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Invalid backup range: {0}")]
    InvalidRange(String),

    #[error("Conversion declined by operator")]
    Declined,

    #[error("Failed to mount backup {backup}: {reason}")]
    MountAcquisition { backup: String, reason: String },

    #[error("{program} failed: {reason}")]
    Tool { program: String, reason: String },

    #[error("Unreadable backup metadata: {0}")]
    Metadata(String),

    #[error("Duplicate backup key in listing: {0}")]
    DuplicateBackup(String),

    #[error("Backup {active} is still active, cannot activate {requested}")]
    RegistryOccupied { active: String, requested: String },

    #[error("Invalid lifecycle transition: {0}")]
    Lifecycle(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConvertError {
    /// Process exit status for this error when it reaches `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConvertError::InvalidRange(_) => EXIT_USAGE,
            _ => EXIT_FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ConvertError::InvalidRange("9".into()).exit_code(), EXIT_USAGE);
        assert_eq!(ConvertError::Declined.exit_code(), EXIT_FAILURE);
        assert_eq!(
            ConvertError::Lifecycle("convert before prepare".into()).exit_code(),
            EXIT_FAILURE
        );
    }

    #[test]
    fn test_display_names_backup() {
        let err = ConvertError::MountAcquisition {
            backup: "host-2024-01-01".into(),
            reason: "not ready".into(),
        };
        assert_eq!(err.to_string(), "Failed to mount backup host-2024-01-01: not ready");
    }
}
