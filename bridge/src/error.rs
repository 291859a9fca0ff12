use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Step of an apply that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPhase {
    Artifact,
    Source,
    Deployment,
    Convergence,
    GarbageCollect,
}

impl fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Artifact => "artifact creation",
            Self::Source => "source upsert",
            Self::Deployment => "deployment upsert",
            Self::Convergence => "convergence wait",
            Self::GarbageCollect => "garbage collection",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0:#}")]
    StorageIo(anyhow::Error),

    #[error("backend error: {0:#}")]
    BackendIo(anyhow::Error),

    #[error("timed out after {timeout:?} waiting for {name} to converge on revision {revision}")]
    ConvergenceTimeout {
        name: String,
        revision: String,
        timeout: Duration,
    },

    #[error("reconciliation stalled: {0}")]
    ConvergenceStalled(String),

    #[error("unexpected deployment status: {0}")]
    UnexpectedStatus(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("apply failed during {phase}: {source}")]
    ApplyFailed {
        phase: ApplyPhase,
        #[source]
        source: Box<BridgeError>,
    },
}

impl BridgeError {
    /// Tags the error with the apply phase it came from.
    ///
    /// Argument errors are returned as-is since they never reach a phase
    /// with side effects.
    #[must_use]
    pub fn in_phase(self, phase: ApplyPhase) -> Self {
        match self {
            Self::InvalidArgument(_) | Self::ApplyFailed { .. } => self,
            other => Self::ApplyFailed {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any phase tags removed
    pub fn root(&self) -> &BridgeError {
        match self {
            Self::ApplyFailed { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }

    pub fn phase(&self) -> Option<ApplyPhase> {
        match self {
            Self::ApplyFailed { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
