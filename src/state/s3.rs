//! S3-based snapshot storage backend.
//!
//! This module provides remote snapshot storage using AWS S3 (or compatible
//! services) so a team can share one snapshot per project/environment.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{Result, StateError, StratoError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
use super::store::SnapshotStore;
use super::types::{AppliedSnapshot, NodeRecord};

/// Snapshot object key suffix.
const SNAPSHOT_KEY: &str = "snapshot.json";

/// Lock object key suffix.
const LOCK_KEY: &str = "snapshot.lock";

/// S3-based snapshot store.
#[derive(Debug)]
pub struct S3SnapshotStore {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Key prefix.
    prefix: String,
    /// Project name, used for empty-document initialization.
    project: String,
    /// Environment name, used for empty-document initialization.
    environment: String,
}

impl S3SnapshotStore {
    /// Creates a new S3 snapshot store.
    ///
    /// # Errors
    ///
    /// Returns an error if the S3 client cannot be initialized.
    pub async fn new(
        bucket: &str,
        prefix: Option<&str>,
        region: Option<&str>,
        project: &str,
        environment: &str,
    ) -> Result<Self> {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };

        let client = Client::new(&config);
        Ok(Self::with_client(client, bucket, prefix, project, environment))
    }

    /// Creates a new S3 snapshot store with an existing client.
    #[must_use]
    pub fn with_client(
        client: Client,
        bucket: &str,
        prefix: Option<&str>,
        project: &str,
        environment: &str,
    ) -> Self {
        let prefix = prefix
            .map(|p| {
                let p = p.trim_matches('/');
                if p.is_empty() {
                    String::new()
                } else {
                    format!("{p}/")
                }
            })
            .unwrap_or_default();

        Self {
            client,
            bucket: bucket.to_string(),
            prefix,
            project: project.to_string(),
            environment: environment.to_string(),
        }
    }

    /// Gets the full S3 key for a file.
    fn key(&self, file: &str) -> String {
        format!("{}{file}", self.prefix)
    }

    /// Gets an object from S3.
    async fn get_object(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(response) => {
                let bytes = response.body.collect().await.map_err(|e| {
                    StratoError::State(StateError::backend(format!(
                        "Failed to read S3 object: {e}"
                    )))
                })?;

                let content = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    StratoError::State(StateError::Corrupted {
                        message: format!("Invalid UTF-8 in S3 object: {e}"),
                    })
                })?;

                Ok(Some(content))
            }
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(StratoError::State(StateError::backend(format!(
                        "S3 get error: {service_err}"
                    ))))
                }
            }
        }
    }

    /// Puts an object to S3.
    async fn put_object(&self, key: &str, content: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(content.as_bytes().to_vec().into())
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StratoError::State(StateError::backend(format!("S3 put error: {e}"))))?;

        Ok(())
    }

    /// Deletes an object from S3.
    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StratoError::State(StateError::backend(format!("S3 delete error: {e}")))
            })?;

        Ok(())
    }

    /// Checks if an object exists in S3.
    async fn object_exists(&self, key: &str) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StratoError::State(StateError::backend(format!(
                        "S3 head error: {service_err}"
                    ))))
                }
            }
        }
    }

    /// Loads the snapshot, or a fresh empty document if none exists.
    async fn load_or_empty(&self) -> Result<AppliedSnapshot> {
        Ok(self
            .load()
            .await?
            .unwrap_or_else(|| AppliedSnapshot::new(&self.project, &self.environment)))
    }
}

#[async_trait]
impl SnapshotStore for S3SnapshotStore {
    async fn load(&self) -> Result<Option<AppliedSnapshot>> {
        let key = self.key(SNAPSHOT_KEY);
        debug!("Loading snapshot from s3://{}/{key}", self.bucket);

        let content = self.get_object(&key).await?;

        if let Some(json) = content {
            let snapshot: AppliedSnapshot = serde_json::from_str(&json).map_err(|e| {
                StratoError::State(StateError::Corrupted {
                    message: format!("Failed to parse snapshot: {e}"),
                })
            })?;

            snapshot.ensure_version_supported()?;

            info!(
                "Loaded snapshot for project: {}/{}",
                snapshot.project, snapshot.environment
            );
            Ok(Some(snapshot))
        } else {
            debug!("No snapshot found in S3");
            Ok(None)
        }
    }

    async fn save(&self, snapshot: &AppliedSnapshot) -> Result<()> {
        let key = self.key(SNAPSHOT_KEY);
        debug!("Saving snapshot to s3://{}/{key}", self.bucket);

        let content = serde_json::to_string_pretty(snapshot).map_err(|e| {
            StratoError::State(StateError::serialization(format!(
                "Failed to serialize snapshot: {e}"
            )))
        })?;

        self.put_object(&key, &content).await?;

        debug!("Snapshot saved successfully to S3");
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
        let snapshot_key = self.key(SNAPSHOT_KEY);
        let lock_key = self.key(LOCK_KEY);

        info!("Deleting snapshot from s3://{}/{snapshot_key}", self.bucket);

        self.delete_object(&snapshot_key).await?;
        self.delete_object(&lock_key).await?;

        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        let key = self.key(SNAPSHOT_KEY);
        self.object_exists(&key).await
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        let key = self.key(LOCK_KEY);

        // Check for existing lock
        if let Some(content) = self.get_object(&key).await? {
            let existing: LockInfo = serde_json::from_str(&content).map_err(|e| {
                StratoError::State(StateError::Corrupted {
                    message: format!("Failed to parse lock: {e}"),
                })
            })?;

            if !existing.is_expired() {
                return Err(StratoError::State(StateError::LockedByOther {
                    holder: existing.holder.clone(),
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            debug!("Expired lock found, taking over");
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id);

        let content = serde_json::to_string_pretty(&lock_info).map_err(|e| {
            StratoError::State(StateError::serialization(format!(
                "Failed to serialize lock: {e}"
            )))
        })?;

        self.put_object(&key, &content).await?;

        info!(
            "Acquired snapshot lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        let key = self.key(LOCK_KEY);

        if let Some(content) = self.get_object(&key).await? {
            let existing: LockInfo = serde_json::from_str(&content).map_err(|e| {
                StratoError::State(StateError::Corrupted {
                    message: format!("Failed to parse lock: {e}"),
                })
            })?;

            if existing.lock_id == lock_id {
                self.delete_object(&key).await?;
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
        let key = self.key(LOCK_KEY);

        if let Some(content) = self.get_object(&key).await? {
            let lock_info: LockInfo = serde_json::from_str(&content).map_err(|e| {
                StratoError::State(StateError::Corrupted {
                    message: format!("Failed to parse lock: {e}"),
                })
            })?;

            return Ok(Some(lock_info));
        }

        Ok(None)
    }

    async fn is_locked(&self) -> Result<bool> {
        if let Some(lock_info) = self.get_lock_info().await? {
            return Ok(!lock_info.is_expired());
        }
        Ok(false)
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}
