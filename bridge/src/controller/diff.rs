use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::Controller;
use crate::error::{BridgeError, Result};
use crate::storage::DATA_FILE_NAME;

/// Outcome of comparing requested content with what was last deployed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub drifted: bool,
    pub message: String,
}

impl Drift {
    fn drifted(message: impl Into<String>) -> Self {
        Self {
            drifted: true,
            message: message.into(),
        }
    }

    fn none() -> Self {
        Self {
            drifted: false,
            message: "No drift detected".to_string(),
        }
    }
}

impl Controller {
    /// Check whether the last deployed revision of `name` still carries `expected`.
    ///
    /// Read-only. Missing resources are reported as drift, not as errors.
    #[instrument(skip(self, cancel, expected), fields(namespace = %self.config.namespace))]
    pub async fn diff(&self, cancel: &CancellationToken, name: &str, expected: &[u8]) -> Result<Drift> {
        if name.is_empty() {
            return Err(BridgeError::InvalidArgument("name can't be empty".to_string()));
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BridgeError::Cancelled),
            drift = self.compare(name, expected) => drift,
        }
    }

    async fn compare(&self, name: &str, expected: &[u8]) -> Result<Drift> {
        let key = self.key(name);

        let Some(deployment) = self
            .backend
            .get_deployment(&key)
            .await
            .map_err(BridgeError::BackendIo)?
        else {
            return Ok(Drift::drifted(format!("Kustomization {name} could not be found")));
        };

        let Some(source) = self
            .backend
            .get_source(&key)
            .await
            .map_err(BridgeError::BackendIo)?
        else {
            return Ok(Drift::drifted(format!(
                "External Artifact {name} could not be found"
            )));
        };

        let Some(artifact) = source.artifact() else {
            return Ok(Drift::drifted("External Artifact status is empty"));
        };

        if !self.store.exists(artifact).await? {
            return Ok(Drift::drifted("Artifact does not exist on disk"));
        }

        if artifact.revision != deployment.last_applied_revision() {
            debug!(
                "Artifact revision {} differs from last applied revision {:?}",
                artifact.revision,
                deployment.last_applied_revision()
            );
            return Ok(Drift::drifted(
                "External Artifact revision does not match Kustomization last applied revision",
            ));
        }

        let current = self.store.fetch(artifact, DATA_FILE_NAME).await?;
        if current != expected {
            return Ok(Drift::drifted(
                "External Artifact current data does not match expected data",
            ));
        }

        Ok(Drift::none())
    }
}
