//! Local file-based snapshot storage backend.
//!
//! This module provides a simple file-based snapshot store for local
//! development and single-machine stacks.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Result, StateError, StratoError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
use super::store::SnapshotStore;
use super::types::{AppliedSnapshot, NodeRecord};

/// Default snapshot directory name.
const STATE_DIR: &str = ".strato";

/// Snapshot file name.
const SNAPSHOT_FILE: &str = "snapshot.json";

/// Lock file name.
const LOCK_FILE: &str = "snapshot.lock";

/// Local file-based snapshot store.
#[derive(Debug)]
pub struct LocalSnapshotStore {
    /// Base directory for snapshot files.
    base_dir: PathBuf,
    /// Path to the snapshot file.
    snapshot_path: PathBuf,
    /// Path to the lock file.
    lock_path: PathBuf,
    /// Project name, used for empty-document initialization.
    project: String,
    /// Environment name, used for empty-document initialization.
    environment: String,
}

impl LocalSnapshotStore {
    /// Creates a new local snapshot store rooted in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new(project: &str, environment: &str) -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| StratoError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STATE_DIR);

        Ok(Self::with_base_dir(base_dir, project, environment))
    }

    /// Creates a new local snapshot store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(
        base_dir: impl Into<PathBuf>,
        project: &str,
        environment: &str,
    ) -> Self {
        let base_dir = base_dir.into();
        let snapshot_path = base_dir.join(SNAPSHOT_FILE);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            snapshot_path,
            lock_path,
            project: project.to_string(),
            environment: environment.to_string(),
        }
    }

    /// Creates a new local snapshot store from a custom snapshot file path.
    #[must_use]
    pub fn with_snapshot_path(
        snapshot_path: impl Into<PathBuf>,
        project: &str,
        environment: &str,
    ) -> Self {
        let snapshot_path = snapshot_path.into();
        let base_dir = snapshot_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            snapshot_path,
            lock_path,
            project: project.to_string(),
            environment: environment.to_string(),
        }
    }

    /// Ensures the snapshot directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating snapshot directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await.map_err(|e| {
                StratoError::State(StateError::backend(format!(
                    "Failed to create snapshot directory: {e}"
                )))
            })?;
        }
        Ok(())
    }

    /// Loads the snapshot, or a fresh empty document if none exists.
    async fn load_or_empty(&self) -> Result<AppliedSnapshot> {
        Ok(self
            .load()
            .await?
            .unwrap_or_else(|| AppliedSnapshot::new(&self.project, &self.environment)))
    }

    /// Reads the lock file if it exists.
    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path).await.map_err(|e| {
            StratoError::State(StateError::Corrupted {
                message: format!("Failed to read lock file: {e}"),
            })
        })?;

        let lock_info: LockInfo = serde_json::from_str(&content).map_err(|e| {
            StratoError::State(StateError::Corrupted {
                message: format!("Failed to parse lock file: {e}"),
            })
        })?;

        Ok(Some(lock_info))
    }

    /// Writes the lock file.
    async fn write_lock_file(&self, lock_info: &LockInfo) -> Result<()> {
        self.ensure_dir().await?;

        let content = serde_json::to_string_pretty(lock_info).map_err(|e| {
            StratoError::State(StateError::serialization(format!(
                "Failed to serialize lock: {e}"
            )))
        })?;

        let mut file = fs::File::create(&self.lock_path).await.map_err(|e| {
            StratoError::State(StateError::LockFailed {
                message: format!("Failed to create lock file: {e}"),
            })
        })?;

        file.write_all(content.as_bytes()).await.map_err(|e| {
            StratoError::State(StateError::LockFailed {
                message: format!("Failed to write lock file: {e}"),
            })
        })?;

        file.sync_all().await.map_err(|e| {
            StratoError::State(StateError::LockFailed {
                message: format!("Failed to sync lock file: {e}"),
            })
        })?;

        Ok(())
    }

    /// Deletes the lock file.
    async fn delete_lock_file(&self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).await.map_err(|e| {
                StratoError::State(StateError::LockFailed {
                    message: format!("Failed to delete lock file: {e}"),
                })
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for LocalSnapshotStore {
    async fn load(&self) -> Result<Option<AppliedSnapshot>> {
        if !self.snapshot_path.exists() {
            debug!("Snapshot file does not exist: {}", self.snapshot_path.display());
            return Ok(None);
        }

        info!("Loading snapshot from: {}", self.snapshot_path.display());

        let content = fs::read_to_string(&self.snapshot_path).await.map_err(|e| {
            StratoError::State(StateError::Corrupted {
                message: format!("Failed to read snapshot file: {e}"),
            })
        })?;

        let snapshot: AppliedSnapshot = serde_json::from_str(&content).map_err(|e| {
            StratoError::State(StateError::Corrupted {
                message: format!("Failed to parse snapshot file: {e}"),
            })
        })?;
        snapshot.ensure_version_supported()?;

        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &AppliedSnapshot) -> Result<()> {
        self.ensure_dir().await?;

        debug!("Saving snapshot to: {}", self.snapshot_path.display());

        let content = serde_json::to_string_pretty(snapshot).map_err(|e| {
            StratoError::State(StateError::serialization(format!(
                "Failed to serialize snapshot: {e}"
            )))
        })?;

        // Write to a temporary file first, then rename for atomicity
        let temp_path = self.snapshot_path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            StratoError::State(StateError::backend(format!(
                "Failed to create temp snapshot file: {e}"
            )))
        })?;

        file.write_all(content.as_bytes()).await.map_err(|e| {
            StratoError::State(StateError::backend(format!(
                "Failed to write snapshot file: {e}"
            )))
        })?;

        file.sync_all().await.map_err(|e| {
            StratoError::State(StateError::backend(format!(
                "Failed to sync snapshot file: {e}"
            )))
        })?;

        // Atomic rename
        fs::rename(&temp_path, &self.snapshot_path).await.map_err(|e| {
            StratoError::State(StateError::backend(format!(
                "Failed to rename snapshot file: {e}"
            )))
        })?;

        debug!("Snapshot saved successfully");
        Ok(())
    }

    async fn commit_node(&self, record: &NodeRecord) -> Result<()> {
        let mut snapshot = self.load_or_empty().await?;
        snapshot.set_node(record.clone());
        self.save(&snapshot).await?;
        debug!("Committed node record: {}", record.name);
        Ok(())
    }

    async fn remove_node(&self, name: &str) -> Result<()> {
        let mut snapshot = self.load_or_empty().await?;
        if snapshot.remove_node(name).is_some() {
            self.save(&snapshot).await?;
            debug!("Removed node record: {name}");
        }
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        if self.snapshot_path.exists() {
            info!("Deleting snapshot file: {}", self.snapshot_path.display());
            fs::remove_file(&self.snapshot_path).await.map_err(|e| {
                StratoError::State(StateError::backend(format!(
                    "Failed to delete snapshot file: {e}"
                )))
            })?;
        }

        // Also delete lock file
        self.delete_lock_file().await?;

        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.snapshot_path.exists())
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        // Check for existing lock
        if let Some(existing) = self.read_lock_file().await? {
            if !existing.is_expired() {
                return Err(StratoError::State(StateError::LockedByOther {
                    holder: existing.holder.clone(),
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            // Lock is expired, we can take it
            debug!("Expired lock found, taking over");
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id);
        self.write_lock_file(&lock_info).await?;

        info!(
            "Acquired snapshot lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.lock_id == lock_id {
                self.delete_lock_file().await?;
                info!("Released snapshot lock: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        self.read_lock_file().await
    }

    async fn is_locked(&self) -> Result<bool> {
        if let Some(lock_info) = self.read_lock_file().await? {
            return Ok(!lock_info.is_expired());
        }
        Ok(false)
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}
