use std::fmt;

use shared_types::condition::{PROGRESSING_REASON, READY, RECONCILING};
use shared_types::{ConditionStatus, DeploymentDescriptor};

/// Aggregated readiness of a deployment, in the spirit of kstatus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Current,
    InProgress,
    Failed,
    Terminating,
    Unknown,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Current => "Current",
            Self::InProgress => "InProgress",
            Self::Failed => "Failed",
            Self::Terminating => "Terminating",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Reduce a deployment's metadata and conditions to a single [`Readiness`].
///
/// Rules are checked in order: deletion in progress, stale observed
/// generation, an active `Reconciling` condition, then the `Ready` condition.
pub fn compute(deployment: &DeploymentDescriptor) -> Readiness {
    if deployment.metadata.deletion_timestamp.is_some() {
        return Readiness::Terminating;
    }

    let observed = deployment
        .status
        .as_ref()
        .and_then(|s| s.observed_generation);
    if let (Some(generation), Some(observed)) = (deployment.metadata.generation, observed) {
        if observed < generation {
            return Readiness::InProgress;
        }
    }

    if deployment.condition(RECONCILING).is_some_and(|c| c.is_true()) {
        return Readiness::InProgress;
    }

    match deployment.condition(READY) {
        Some(ready) => match ready.status {
            ConditionStatus::True => Readiness::Current,
            ConditionStatus::Unknown => Readiness::InProgress,
            ConditionStatus::False if ready.reason == PROGRESSING_REASON => Readiness::InProgress,
            ConditionStatus::False => Readiness::Failed,
        },
        None => Readiness::Unknown,
    }
}
