use shared_types::condition::{READY, SUCCEEDED_REASON};
use shared_types::{
    Artifact, Condition, ConditionStatus, DeploymentDescriptor, DeploymentSpec, ObjectKey,
    ObjectMeta, Resource, SourceDescriptor, SourceReference, SourceStatus,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::Controller;
use crate::error::{ApplyPhase, BridgeError, Result};

impl Controller {
    /// Publish `content` as revision `revision` of `name` and block until
    /// the reconciler has deployed it.
    ///
    /// Superseded artifacts of the same name are garbage collected once the
    /// new revision is current. An artifact written before a later phase
    /// fails is left behind until the next successful apply.
    #[instrument(skip(self, cancel, content), fields(namespace = %self.config.namespace))]
    pub async fn apply(
        &self,
        cancel: &CancellationToken,
        name: &str,
        revision: &str,
        content: &[u8],
    ) -> Result<()> {
        if name.is_empty() {
            return Err(BridgeError::InvalidArgument("name can't be empty".to_string()));
        }
        if revision.is_empty() {
            return Err(BridgeError::InvalidArgument("revision can't be empty".to_string()));
        }
        if content.is_empty() {
            return Err(BridgeError::InvalidArgument("content can't be empty".to_string()));
        }
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        let key = self.key(name);

        let artifact = self
            .store
            .create(name, revision, content)
            .await
            .map_err(|e| e.in_phase(ApplyPhase::Artifact))?;
        info!("Created artifact {} ({})", artifact.path, artifact.digest);

        self.upsert_source(&key, &artifact)
            .await
            .map_err(|e| e.in_phase(ApplyPhase::Source))?;

        let deployment = self
            .upsert_deployment(&key)
            .await
            .map_err(|e| e.in_phase(ApplyPhase::Deployment))?;

        let timeout = deployment
            .spec
            .timeout
            .unwrap_or(self.config.deploy_timeout);
        info!("Waiting up to {:?} for {} to reach {}", timeout, key, revision);
        self.poller()
            .wait(cancel, &key, revision, timeout)
            .await
            .map_err(|e| e.in_phase(ApplyPhase::Convergence))?;
        info!("Kustomization {} is current at revision {}", key, revision);

        self.store
            .garbage_collect(name, &artifact, self.config.gc_timeout)
            .await
            .map_err(|e| e.in_phase(ApplyPhase::GarbageCollect))?;

        Ok(())
    }

    async fn upsert_source(&self, key: &ObjectKey, artifact: &Artifact) -> Result<SourceDescriptor> {
        let mut source = SourceDescriptor::new(key);
        source.metadata = ObjectMeta::new(key).managed_by(&self.config.field_manager);
        self.backend
            .apply_source(&source)
            .await
            .map_err(BridgeError::BackendIo)?;

        source.status = Some(SourceStatus {
            artifact: Some(artifact.clone()),
            conditions: vec![Condition::new(
                READY,
                ConditionStatus::True,
                SUCCEEDED_REASON,
                "Artifact is ready",
            )],
        });
        let applied = self
            .backend
            .apply_source_status(&source)
            .await
            .map_err(BridgeError::BackendIo)?;
        info!("Applied ExternalArtifact {} at revision {}", key, artifact.revision);
        Ok(applied)
    }

    async fn upsert_deployment(&self, key: &ObjectKey) -> Result<DeploymentDescriptor> {
        let spec = DeploymentSpec {
            source_ref: SourceReference {
                kind: SourceDescriptor::KIND.to_string(),
                name: key.name.clone(),
                namespace: key.namespace.clone(),
            },
            path: String::new(),
            interval: self.config.deploy_interval,
            timeout: Some(self.config.deploy_timeout),
            wait: true,
            prune: true,
        };
        let mut deployment = DeploymentDescriptor::new(key, spec);
        deployment.metadata = ObjectMeta::new(key).managed_by(&self.config.field_manager);

        let applied = self
            .backend
            .apply_deployment(&deployment)
            .await
            .map_err(BridgeError::BackendIo)?;
        info!(
            "Applied Kustomization {} (generation {})",
            key,
            applied.metadata.generation.unwrap_or_default()
        );
        Ok(applied)
    }
}
