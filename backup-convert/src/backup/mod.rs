//! Backups as seen by the converter, independent of the backend that
//! listed them.

pub mod range;

use crate::utils::{ConvertError, Result};
use chrono::{DateTime, Timelike, Utc};
use std::collections::HashSet;
use std::fmt;

/// One point-in-time snapshot in a source or destination repository.
#[derive(Debug, Clone, PartialEq)]
pub struct Backup {
    /// Stable unique key (borg archive name, restic snapshot id)
    pub key: String,

    /// Name shown to the operator and reused for the destination archive
    pub name: String,

    /// Creation time, truncated to microseconds
    pub time: DateTime<Utc>,

    /// Raw backend record (tags, paths, hostname, ...)
    pub metadata: serde_json::Value,
}

impl Backup {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        time: DateTime<Utc>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            time: truncate_to_micros(time),
            metadata,
        }
    }
}

impl fmt::Display for Backup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.name, self.time.format("%Y-%m-%d %H:%M:%S%.6f UTC"))
    }
}

/// Drop sub-microsecond precision (restic reports nanoseconds).
pub fn truncate_to_micros(time: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = time.nanosecond() / 1_000 * 1_000;
    time.with_nanosecond(nanos).unwrap_or(time)
}

/// Backups in repository listing order, unique by key.
///
/// Positions in this order are what range expressions address.
#[derive(Debug, Clone, Default)]
pub struct BackupCollection {
    backups: Vec<Backup>,
    keys: HashSet<String>,
}

impl BackupCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a backup, rejecting a key that is already present.
    pub fn insert(&mut self, backup: Backup) -> Result<()> {
        if !self.keys.insert(backup.key.clone()) {
            return Err(ConvertError::DuplicateBackup(backup.key));
        }
        self.backups.push(backup);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.backups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Backup> {
        self.backups.iter()
    }

    pub fn as_slice(&self) -> &[Backup] {
        &self.backups
    }
}

impl TryFrom<Vec<Backup>> for BackupCollection {
    type Error = ConvertError;

    fn try_from(backups: Vec<Backup>) -> Result<Self> {
        let mut collection = Self::new();
        for backup in backups {
            collection.insert(backup)?;
        }
        Ok(collection)
    }
}

impl<'a> IntoIterator for &'a BackupCollection {
    type Item = &'a Backup;
    type IntoIter = std::slice::Iter<'a, Backup>;

    fn into_iter(self) -> Self::IntoIter {
        self.backups.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn backup(key: &str) -> Backup {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Backup::new(key, key, time, serde_json::Value::Null)
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let collection = BackupCollection::try_from(vec![backup("c"), backup("a"), backup("b")]).unwrap();
        let keys: Vec<&str> = collection.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut collection = BackupCollection::new();
        collection.insert(backup("a")).unwrap();
        let err = collection.insert(backup("a")).unwrap_err();
        assert!(matches!(err, ConvertError::DuplicateBackup(k) if k == "a"));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_time_truncated_to_micros() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        let b = Backup::new("k", "n", time, serde_json::Value::Null);
        assert_eq!(b.time.nanosecond(), 123_456_000);
        assert_eq!(b.to_string(), "n @ 2024-03-01 12:00:00.123456 UTC");
    }
}
