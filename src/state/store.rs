//! Snapshot store trait definition.
//!
//! This module defines the common interface for snapshot storage backends.
//! The per-node commit operations are what give apply its partial-failure
//! safety: each executed step lands in durable storage before the next step
//! starts.

use async_trait::async_trait;

use crate::error::{Result, StateError};
use super::lock::LockInfo;
use super::types::{AppliedSnapshot, NodeRecord};

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Loads the applied snapshot.
    ///
    /// Returns `None` if no snapshot exists yet.
    async fn load(&self) -> Result<Option<AppliedSnapshot>>;

    /// Saves the full snapshot.
    async fn save(&self, snapshot: &AppliedSnapshot) -> Result<()>;

    /// Commits a single node record into the stored snapshot.
    ///
    /// The stored document is read, updated with the record, and written
    /// back whole, so a crash between steps never loses settled work.
    async fn commit_node(&self, record: &NodeRecord) -> Result<()>;

    /// Removes a single node record from the stored snapshot.
    async fn remove_node(&self, name: &str) -> Result<()>;

    /// Deletes the snapshot.
    async fn delete(&self) -> Result<()>;

    /// Checks if a snapshot exists.
    async fn exists(&self) -> Result<bool>;

    /// Acquires a lock on the snapshot.
    ///
    /// Returns lock information if successful.
    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo>;

    /// Releases a lock on the snapshot.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Checks if the snapshot is locked.
    async fn is_locked(&self) -> Result<bool>;

    /// Fails when another process holds an unexpired lock.
    ///
    /// Planning reads the snapshot through this guard so a plan is never
    /// computed against a baseline that is being rewritten by a concurrent
    /// apply.
    async fn ensure_unlocked(&self) -> Result<()> {
        match self.get_lock_info().await? {
            Some(lock) if !lock.is_expired() => Err(StateError::LockedByOther {
                holder: lock.holder,
                since: lock.acquired_at.to_rfc3339(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl SnapshotStore for Box<dyn SnapshotStore> {
    async fn load(&self) -> Result<Option<AppliedSnapshot>> {
        (**self).load().await
    }

    async fn save(&self, snapshot: &AppliedSnapshot) -> Result<()> {
        (**self).save(snapshot).await
    }

    async fn commit_node(&self, record: &NodeRecord) -> Result<()> {
        (**self).commit_node(record).await
    }

    async fn remove_node(&self, name: &str) -> Result<()> {
        (**self).remove_node(name).await
    }

    async fn delete(&self) -> Result<()> {
        (**self).delete().await
    }

    async fn exists(&self) -> Result<bool> {
        (**self).exists().await
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        (**self).acquire_lock(holder).await
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        (**self).release_lock(lock_id).await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        (**self).get_lock_info().await
    }

    async fn is_locked(&self) -> Result<bool> {
        (**self).is_locked().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
