use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where artifacts live on disk and how they are advertised
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Filesystem root of the artifact tree
    pub path: PathBuf,
    /// Host (and port) other components use to download artifacts
    pub advertised_address: String,
    /// First path segment under the root
    pub namespace: String,
    /// Second path segment under the root, grouping artifacts by producer
    pub owner: String,
    /// Superseded artifacts younger than this survive garbage collection
    #[serde(default)]
    pub retention_ttl: Duration,
}

impl StorageConfig {
    pub fn local(
        path: impl Into<PathBuf>,
        advertised_address: impl Into<String>,
        namespace: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            advertised_address: normalize_address(&advertised_address.into()),
            namespace: namespace.into(),
            owner: owner.into(),
            retention_ttl: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_retention_ttl(mut self, ttl: Duration) -> Self {
        self.retention_ttl = ttl;
        self
    }
}

/// A bare `:port` listen address is advertised as `localhost:port`
fn normalize_address(address: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.starts_with(':') {
        format!("localhost{address}")
    } else {
        address.to_string()
    }
}
