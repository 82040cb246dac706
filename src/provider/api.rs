//! Cloud provider trait definition.
//!
//! This module defines the interface the executor drives. The provider is
//! deliberately narrow: create, update, delete, and status polling over
//! fully resolved attribute maps. Everything topology-aware (ordering,
//! retries, snapshot commits) lives in the planner.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ResourceKind;
use crate::error::Result;

/// A provider-side resource created or updated by a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    /// Provider-assigned resource ID.
    pub id: String,
    /// Lifecycle status as of the response.
    pub status: ResourceStatus,
    /// Emergent outputs known so far. May be partial until the resource
    /// settles.
    pub outputs: BTreeMap<String, String>,
}

/// Lifecycle status of a provider-side resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// The resource is still provisioning.
    Pending,
    /// The resource has settled and all outputs are final.
    Settled,
    /// The resource entered a terminal error state.
    Error,
}

/// Trait for cloud provider backends.
///
/// Implementations perform no retries; classification of transient versus
/// permanent failures is expressed in the returned error, and the executor
/// owns the retry policy.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Creates a resource of the given kind with fully resolved attributes.
    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<CreatedResource>;

    /// Updates mutable attributes of an existing resource in place.
    async fn update(
        &self,
        resource_id: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<CreatedResource>;

    /// Deletes a resource. Deleting a resource the provider no longer knows
    /// about succeeds.
    async fn delete(&self, resource_id: &str) -> Result<()>;

    /// Fetches the current lifecycle status and outputs of a resource.
    async fn get_status(&self, resource_id: &str) -> Result<CreatedResource>;
}

#[async_trait]
impl CloudProvider for Box<dyn CloudProvider> {
    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<CreatedResource> {
        (**self).create(kind, name, attributes).await
    }

    async fn update(
        &self,
        resource_id: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<CreatedResource> {
        (**self).update(resource_id, attributes).await
    }

    async fn delete(&self, resource_id: &str) -> Result<()> {
        (**self).delete(resource_id).await
    }

    async fn get_status(&self, resource_id: &str) -> Result<CreatedResource> {
        (**self).get_status(resource_id).await
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Pending => "pending",
            Self::Settled => "settled",
            Self::Error => "error",
        };
        write!(f, "{status}")
    }
}
