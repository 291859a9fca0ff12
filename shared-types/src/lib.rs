#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod artifact;
pub mod condition;
pub mod deployment;
pub mod duration;
pub mod source;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use artifact::Artifact;
pub use condition::{Condition, ConditionStatus};
pub use deployment::{DeploymentDescriptor, DeploymentSpec, DeploymentStatus, SourceReference};
pub use source::{SourceDescriptor, SourceSpec, SourceStatus};

/// Label attached to every object the bridge creates
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Namespaced identity of a backend object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Subset of Kubernetes object metadata the bridge reads or writes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

impl ObjectMeta {
    pub fn new(key: &ObjectKey) -> Self {
        Self {
            name: key.name.clone(),
            namespace: key.namespace.clone(),
            ..Self::default()
        }
    }

    /// Adds the managed-by label with the given manager name
    #[must_use]
    pub fn managed_by(mut self, manager: &str) -> Self {
        self.labels
            .insert(MANAGED_BY_LABEL.to_string(), manager.to_string());
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// A typed backend object addressable through the REST API.
///
/// `API_VERSION` is the `group/version` string, which doubles as the URL
/// segment under `/apis`.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync {
    const API_VERSION: &'static str;
    const KIND: &'static str;
    const PLURAL: &'static str;

    fn metadata(&self) -> &ObjectMeta;

    fn key(&self) -> ObjectKey {
        self.metadata().key()
    }
}

/// List envelope returned by collection endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct ObjectList<T> {
    #[serde(default)]
    pub items: Vec<T>,
}
