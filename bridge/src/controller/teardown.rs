use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::Controller;
use crate::error::{BridgeError, Result};

impl Controller {
    /// Remove the deployment, its source and every artifact of `name`.
    ///
    /// The deployment goes first and is waited on until the reconciler has
    /// finalized it, so that pruning still sees the source. Missing objects
    /// are skipped, which makes repeated calls succeed.
    #[instrument(skip(self, cancel), fields(namespace = %self.config.namespace))]
    pub async fn delete(&self, cancel: &CancellationToken, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(BridgeError::InvalidArgument("name can't be empty".to_string()));
        }
        let key = self.key(name);

        if self
            .backend
            .delete_deployment(&key)
            .await
            .map_err(BridgeError::BackendIo)?
        {
            info!("Deleting Kustomization {}", key);
        }
        self.poller().wait_deleted(cancel, &key).await?;
        info!("Kustomization {} is gone", key);

        let source = self
            .backend
            .get_source(&key)
            .await
            .map_err(BridgeError::BackendIo)?;
        if self
            .backend
            .delete_source(&key)
            .await
            .map_err(BridgeError::BackendIo)?
        {
            info!("Deleted ExternalArtifact {}", key);
        }

        if let Some(artifact) = source.as_ref().and_then(|s| s.artifact()) {
            let removed = self.store.remove_all(artifact).await?;
            info!("Removed {} artifact(s) for {}", removed, key);
        }

        Ok(())
    }
}
