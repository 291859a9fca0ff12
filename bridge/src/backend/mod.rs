mod kube;
mod memory;

use anyhow::Result;
use async_trait::async_trait;
use shared_types::{DeploymentDescriptor, ObjectKey, SourceDescriptor};

pub use kube::KubeBackend;
pub use memory::{MemoryBackend, Op, ReconcileHook, converge};

/// Access to the declarative backend's object store.
///
/// `get_*` returns `None` and `delete_*` returns `false` when the object does
/// not exist. `apply_*` is a forced server-side apply: the fields in the
/// given object become owned by the caller and everything else on the stored
/// object is left alone.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get_source(&self, key: &ObjectKey) -> Result<Option<SourceDescriptor>>;

    async fn apply_source(&self, source: &SourceDescriptor) -> Result<SourceDescriptor>;

    /// Apply only the `status` of the given object through the status subresource
    async fn apply_source_status(&self, source: &SourceDescriptor) -> Result<SourceDescriptor>;

    async fn delete_source(&self, key: &ObjectKey) -> Result<bool>;

    async fn list_sources(&self, namespace: &str) -> Result<Vec<SourceDescriptor>>;

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<DeploymentDescriptor>>;

    async fn apply_deployment(
        &self,
        deployment: &DeploymentDescriptor,
    ) -> Result<DeploymentDescriptor>;

    async fn delete_deployment(&self, key: &ObjectKey) -> Result<bool>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentDescriptor>>;
}
