use anyhow::Result;
use async_trait::async_trait;
use kube_client::KubeClient;
use shared_types::{DeploymentDescriptor, MANAGED_BY_LABEL, ObjectKey, SourceDescriptor};

use super::Backend;

/// Backend talking to a live Kubernetes API server
pub struct KubeBackend {
    client: KubeClient,
    label_selector: String,
}

impl KubeBackend {
    /// Listing is restricted to objects labelled as managed by `manager`
    pub fn new(client: KubeClient, manager: &str) -> Self {
        Self {
            client,
            label_selector: format!("{MANAGED_BY_LABEL}={manager}"),
        }
    }
}

#[async_trait]
impl Backend for KubeBackend {
    async fn get_source(&self, key: &ObjectKey) -> Result<Option<SourceDescriptor>> {
        self.client.get(key).await
    }

    async fn apply_source(&self, source: &SourceDescriptor) -> Result<SourceDescriptor> {
        self.client.apply(source).await
    }

    async fn apply_source_status(&self, source: &SourceDescriptor) -> Result<SourceDescriptor> {
        self.client.apply_status(source).await
    }

    async fn delete_source(&self, key: &ObjectKey) -> Result<bool> {
        self.client.delete::<SourceDescriptor>(key).await
    }

    async fn list_sources(&self, namespace: &str) -> Result<Vec<SourceDescriptor>> {
        self.client
            .list(namespace, Some(self.label_selector.as_str()))
            .await
    }

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<DeploymentDescriptor>> {
        self.client.get(key).await
    }

    async fn apply_deployment(
        &self,
        deployment: &DeploymentDescriptor,
    ) -> Result<DeploymentDescriptor> {
        self.client.apply(deployment).await
    }

    async fn delete_deployment(&self, key: &ObjectKey) -> Result<bool> {
        self.client.delete::<DeploymentDescriptor>(key).await
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentDescriptor>> {
        self.client
            .list(namespace, Some(self.label_selector.as_str()))
            .await
    }
}
