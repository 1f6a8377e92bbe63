//! Per-backup conversion sessions and the resources they hold.

pub mod lifecycle;
pub mod mount;
pub mod registry;

pub use lifecycle::{BackupSession, LifecycleState, SessionOptions};
pub use mount::{MountHandle, MountResource, ReleaseReport};
pub use registry::ActiveBackupRegistry;
