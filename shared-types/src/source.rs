use serde::{Deserialize, Serialize};

use crate::{Artifact, Condition, ObjectKey, ObjectMeta, Resource};

/// `ExternalArtifact`: advertises the latest artifact for a name to the reconciler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: SourceSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SourceStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceSpec {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl SourceDescriptor {
    pub fn new(key: &ObjectKey) -> Self {
        Self {
            api_version: Self::API_VERSION.to_string(),
            kind: Self::KIND.to_string(),
            metadata: ObjectMeta::new(key),
            spec: SourceSpec::default(),
            status: None,
        }
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.status.as_ref().and_then(|s| s.artifact.as_ref())
    }
}

impl Resource for SourceDescriptor {
    const API_VERSION: &'static str = "source.toolkit.fluxcd.io/v1";
    const KIND: &'static str = "ExternalArtifact";
    const PLURAL: &'static str = "externalartifacts";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}
