use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable descriptor of one archived revision of a payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Storage-relative path, e.g. `ns/owner/name/rev.tar.gz`
    pub path: String,
    pub url: String,
    pub revision: String,
    /// `sha256:<hex>` of the archive bytes
    #[serde(default)]
    pub digest: String,
    pub last_update_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Artifact {
    /// Directory part of the storage path
    pub fn dir(&self) -> &str {
        self.path.rsplit_once('/').map_or("", |(dir, _)| dir)
    }
}
