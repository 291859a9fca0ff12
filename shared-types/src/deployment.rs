use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::condition::{self, Condition};
use crate::{ObjectKey, ObjectMeta, Resource};

/// `Kustomization`: the convergence target the reconciler drives toward
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDescriptor {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: DeploymentSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeploymentStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub source_ref: SourceReference,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(with = "crate::duration")]
    pub interval: Duration,
    #[serde(
        default,
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub wait: bool,
    #[serde(default)]
    pub prune: bool,
}

/// Cross-namespace reference to a source object
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceReference {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_attempted_revision: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_applied_revision: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl DeploymentDescriptor {
    pub fn new(key: &ObjectKey, spec: DeploymentSpec) -> Self {
        Self {
            api_version: Self::API_VERSION.to_string(),
            kind: Self::KIND.to_string(),
            metadata: ObjectMeta::new(key),
            spec,
            status: None,
        }
    }

    pub fn last_attempted_revision(&self) -> &str {
        self.status
            .as_ref()
            .map_or("", |s| s.last_attempted_revision.as_str())
    }

    pub fn last_applied_revision(&self) -> &str {
        self.status
            .as_ref()
            .map_or("", |s| s.last_applied_revision.as_str())
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.status
            .as_ref()
            .and_then(|s| condition::find(&s.conditions, type_))
    }
}

impl Resource for DeploymentDescriptor {
    const API_VERSION: &'static str = "kustomize.toolkit.fluxcd.io/v1";
    const KIND: &'static str = "Kustomization";
    const PLURAL: &'static str = "kustomizations";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}
