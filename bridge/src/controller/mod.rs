//! Reconciliation driver for Flux `ExternalArtifact` + `Kustomization` pairs.
//!
//! A unit of configuration named `name` maps onto three resources: an
//! artifact blob in the [`ArtifactStore`], an `ExternalArtifact` pointing at
//! it and a `Kustomization` deploying that source. [`Controller::apply`],
//! [`Controller::diff`] and [`Controller::delete`] drive all three.

mod apply;
mod diff;
mod poller;
mod status;
mod teardown;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use shared_types::ObjectKey;
use tracing::info;

use crate::backend::Backend;
use crate::error::{BridgeError, Result};
use crate::storage::ArtifactStore;

pub use diff::Drift;
pub use poller::ConvergencePoller;
pub use status::{Readiness, compute as compute_readiness};

pub const DEFAULT_FIELD_MANAGER: &str = "flux-bridge";

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace holding every descriptor this controller manages
    pub namespace: String,
    /// Server-side apply field manager, also used as the managed-by label
    pub field_manager: String,
    pub poll_interval: Duration,
    /// `spec.interval` of created deployments
    pub deploy_interval: Duration,
    /// `spec.timeout` of created deployments, which also bounds the convergence wait
    pub deploy_timeout: Duration,
    pub gc_timeout: Duration,
}

impl ControllerConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            poll_interval: Duration::from_secs(2),
            deploy_interval: Duration::from_secs(60),
            deploy_timeout: Duration::from_secs(300),
            gc_timeout: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_deploy_timeout(mut self, timeout: Duration) -> Self {
        self.deploy_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_gc_timeout(mut self, timeout: Duration) -> Self {
        self.gc_timeout = timeout;
        self
    }
}

pub struct Controller {
    backend: Arc<dyn Backend>,
    store: Arc<ArtifactStore>,
    config: ControllerConfig,
}

impl Controller {
    pub fn new(backend: Arc<dyn Backend>, store: Arc<ArtifactStore>, config: ControllerConfig) -> Self {
        Self {
            backend,
            store,
            config,
        }
    }

    /// Build a controller after checking both descriptor kinds can be listed
    pub async fn connect(
        backend: Arc<dyn Backend>,
        store: Arc<ArtifactStore>,
        config: ControllerConfig,
    ) -> Result<Self> {
        let sources = backend
            .list_sources(&config.namespace)
            .await
            .map_err(BridgeError::BackendIo)?;
        let deployments = backend
            .list_deployments(&config.namespace)
            .await
            .map_err(BridgeError::BackendIo)?;
        info!(
            "Connected to backend: {} source(s), {} deployment(s) managed in {}",
            sources.len(),
            deployments.len(),
            config.namespace
        );
        Ok(Self::new(backend, store, config))
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Names of the deployments currently managed in the namespace
    pub async fn list(&self) -> Result<Vec<String>> {
        let deployments = self
            .backend
            .list_deployments(&self.config.namespace)
            .await
            .map_err(BridgeError::BackendIo)?;
        let mut names: Vec<String> = deployments
            .into_iter()
            .map(|d| d.metadata.name)
            .collect();
        names.sort();
        Ok(names)
    }

    fn key(&self, name: &str) -> ObjectKey {
        ObjectKey::new(self.config.namespace.clone(), name)
    }

    fn poller(&self) -> ConvergencePoller<'_> {
        ConvergencePoller::new(self.backend.as_ref(), self.config.poll_interval)
    }
}
