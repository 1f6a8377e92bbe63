//! Process-wide record of the backup that currently holds mounted
//! resources.
//!
//! The slot has capacity one: backups are converted strictly one after the
//! other, and the interrupt handler needs to find exactly the resources
//! that are live when a signal arrives. The slot is filled before the first
//! resource is acquired and emptied only after the last one was released.

use super::lifecycle::LifecycleState;
use super::mount::{MountHandle, ReleaseReport};
use crate::utils::{ConvertError, Result};
use std::sync::Arc;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::info;

/// The registered backup and everything it has acquired so far
#[derive(Debug)]
pub struct ActiveBackup {
    pub name: String,
    pub state: LifecycleState,
    pub handle: MountHandle,
}

/// What a release of the active backup did
#[derive(Debug)]
pub struct Released {
    pub name: String,
    /// Lifecycle state the backup was in when released
    pub state: LifecycleState,
    pub report: ReleaseReport,
}

#[derive(Clone, Default)]
pub struct ActiveBackupRegistry {
    slot: Arc<Mutex<Option<ActiveBackup>>>,
}

impl ActiveBackupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` as the active backup and return the locked entry so
    /// resources can be pushed onto its handle while they are acquired.
    ///
    /// Fails if another backup is still registered.
    pub async fn activate(&self, name: &str) -> Result<MappedMutexGuard<'_, ActiveBackup>> {
        let mut slot = self.slot.lock().await;
        if let Some(active) = slot.as_ref() {
            return Err(ConvertError::RegistryOccupied {
                active: active.name.clone(),
                requested: name.to_string(),
            });
        }

        *slot = Some(ActiveBackup {
            name: name.to_string(),
            state: LifecycleState::Idle,
            handle: MountHandle::new(),
        });

        MutexGuard::try_map(slot, |slot| slot.as_mut())
            .map_err(|_| ConvertError::Lifecycle(format!("registration of {} vanished", name)))
    }

    /// Lock the registered entry, if any.
    pub async fn lock(&self) -> Option<MappedMutexGuard<'_, ActiveBackup>> {
        MutexGuard::try_map(self.slot.lock().await, |slot| slot.as_mut()).ok()
    }

    pub async fn active_name(&self) -> Option<String> {
        self.slot.lock().await.as_ref().map(|a| a.name.clone())
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Record a lifecycle transition of the registered backup.
    pub async fn set_state(&self, name: &str, state: LifecycleState) {
        if let Some(active) = self.slot.lock().await.as_mut() {
            if active.name == name {
                active.state = state;
            }
        }
    }

    /// Release whatever is registered and clear the slot afterwards.
    pub async fn release_active(&self) -> Option<Released> {
        self.release_where(|_| true).await
    }

    /// Release the registration only if it belongs to `name`.
    pub async fn release_if(&self, name: &str) -> Option<Released> {
        self.release_where(|active| active.name == name).await
    }

    async fn release_where<F>(&self, predicate: F) -> Option<Released>
    where
        F: FnOnce(&ActiveBackup) -> bool,
    {
        let mut slot = self.slot.lock().await;
        let active = slot.as_mut().filter(|active| predicate(active))?;

        info!("Releasing resources of backup {}", active.name);
        let report = active.handle.release().await;
        let released = Released {
            name: active.name.clone(),
            state: active.state,
            report,
        };

        // cleared only now that every resource is released
        *slot = None;
        Some(released)
    }
}
