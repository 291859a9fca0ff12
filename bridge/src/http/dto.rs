use serde::{Deserialize, Serialize};

use crate::controller::Drift;

/// Request body for publishing a new revision of a unit
#[derive(Debug, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub revision: String,
    /// Raw configuration, stored byte for byte as `data.yaml`
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub name: String,
    pub revision: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiffRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffResponse {
    pub drift: bool,
    pub message: String,
}

impl From<Drift> for DiffResponse {
    fn from(drift: Drift) -> Self {
        Self {
            drift: drift.drifted,
            message: drift.message,
        }
    }
}

/// Names of the units currently deployed
#[derive(Debug, Serialize, Deserialize)]
pub struct ListUnitsResponse {
    pub units: Vec<String>,
}

/// Response for successful operations that don't return data
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}
