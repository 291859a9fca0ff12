use std::future::Future;
use std::time::Duration;

use shared_types::condition::STALLED;
use shared_types::{DeploymentDescriptor, ObjectKey};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::status::{self, Readiness};
use crate::backend::Backend;
use crate::error::{BridgeError, Result};

/// Repeatedly fetches a deployment until the reconciler reports an outcome
pub struct ConvergencePoller<'a> {
    backend: &'a dyn Backend,
    interval: Duration,
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<'a> ConvergencePoller<'a> {
    pub fn new(backend: &'a dyn Backend, interval: Duration) -> Self {
        Self { backend, interval }
    }

    /// Run `check` now and then every interval until it yields a value.
    ///
    /// Returns `Ok(None)` once `deadline` passes. Cancellation wins over
    /// everything else, including a check in flight.
    pub async fn poll_until<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        mut check: F,
    ) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        loop {
            let attempt = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(BridgeError::Cancelled),
                result = check() => result?,
                () = until(deadline) => return Ok(None),
            };
            if let Some(value) = attempt {
                return Ok(Some(value));
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(BridgeError::Cancelled),
                () = until(deadline) => return Ok(None),
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Wait for the deployment at `key` to become ready on `revision`
    pub async fn wait(
        &self,
        cancel: &CancellationToken,
        key: &ObjectKey,
        revision: &str,
        timeout: Duration,
    ) -> Result<DeploymentDescriptor> {
        let deadline = Instant::now() + timeout;
        self.poll_until(cancel, Some(deadline), move || self.check_converged(key, revision))
            .await?
            .ok_or_else(|| BridgeError::ConvergenceTimeout {
                name: key.name.clone(),
                revision: revision.to_string(),
                timeout,
            })
    }

    async fn check_converged(
        &self,
        key: &ObjectKey,
        revision: &str,
    ) -> Result<Option<DeploymentDescriptor>> {
        let Some(deployment) = self
            .backend
            .get_deployment(key)
            .await
            .map_err(BridgeError::BackendIo)?
        else {
            debug!("Kustomization {} not observed yet", key);
            return Ok(None);
        };

        let attempted = deployment.last_attempted_revision();
        if !attempted.is_empty() && attempted != revision {
            debug!(
                "Kustomization {} still on revision {}, waiting for {}",
                key, attempted, revision
            );
            return Ok(None);
        }

        if let Some(stalled) = deployment.condition(STALLED).filter(|c| c.is_true()) {
            return Err(BridgeError::ConvergenceStalled(stalled.message.clone()));
        }

        match status::compute(&deployment) {
            Readiness::Current => Ok(Some(deployment)),
            Readiness::InProgress | Readiness::Unknown => {
                debug!("Kustomization {} not ready yet", key);
                Ok(None)
            }
            other => Err(BridgeError::UnexpectedStatus(format!(
                "Kustomization {key} is {other}"
            ))),
        }
    }

    /// Wait until the deployment at `key` no longer exists. Only `cancel` bounds the wait.
    pub async fn wait_deleted(&self, cancel: &CancellationToken, key: &ObjectKey) -> Result<()> {
        self.poll_until(cancel, None, move || async move {
            let found = self
                .backend
                .get_deployment(key)
                .await
                .map_err(BridgeError::BackendIo)?;
            if found.is_some() {
                debug!("Kustomization {} still present", key);
            }
            Ok(found.is_none().then_some(()))
        })
        .await
        .map(|_| ())
    }
}
