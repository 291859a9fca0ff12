use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use shared_types::condition::READY;
use shared_types::{
    Condition, ConditionStatus, DeploymentDescriptor, ObjectKey, SourceDescriptor,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::Backend;

/// Backend calls whose failure can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    GetSource,
    ApplySource,
    ApplySourceStatus,
    DeleteSource,
    ListSources,
    GetDeployment,
    ApplyDeployment,
    DeleteDeployment,
    ListDeployments,
}

/// Stand-in for the reconciler: runs on every deployment read and may
/// rewrite the deployment's status from the source it references.
pub type ReconcileHook =
    Arc<dyn Fn(&mut DeploymentDescriptor, Option<&SourceDescriptor>) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
enum Kind {
    Source,
    Deployment,
}

#[derive(Default)]
struct Objects {
    sources: BTreeMap<ObjectKey, Value>,
    deployments: BTreeMap<ObjectKey, Value>,
    /// Deployments being finalized and how many reads they survive
    terminating: HashMap<ObjectKey, usize>,
    resource_version: u64,
}

impl Objects {
    fn map(&self, kind: Kind) -> &BTreeMap<ObjectKey, Value> {
        match kind {
            Kind::Source => &self.sources,
            Kind::Deployment => &self.deployments,
        }
    }

    fn map_mut(&mut self, kind: Kind) -> &mut BTreeMap<ObjectKey, Value> {
        match kind {
            Kind::Source => &mut self.sources,
            Kind::Deployment => &mut self.deployments,
        }
    }

    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    /// Merge everything but `status` into the stored object, creating it if needed.
    /// Generation is bumped whenever `spec` changes.
    fn apply(&mut self, kind: Kind, key: &ObjectKey, mut patch: Value) -> Value {
        if let Some(fields) = patch.as_object_mut() {
            fields.remove("status");
        }
        let version = self.next_version();

        let map = self.map_mut(kind);
        let created = !map.contains_key(key);
        let stored = map.entry(key.clone()).or_insert_with(|| json!({}));
        let old_spec = stored.get("spec").cloned();
        merge(stored, &patch);

        if created || stored.get("spec") != old_spec.as_ref() {
            let generation = stored["metadata"]["generation"].as_i64().unwrap_or(0);
            stored["metadata"]["generation"] = json!(generation + 1);
        }
        stored["metadata"]["resourceVersion"] = json!(version);
        stored.clone()
    }

    /// Merge only `status` into an existing object
    fn apply_status(&mut self, kind: Kind, key: &ObjectKey, patch: &Value) -> Result<Value> {
        let version = self.next_version();
        let Some(stored) = self.map_mut(kind).get_mut(key) else {
            bail!("{kind:?} {key} not found");
        };
        if let Some(status) = patch.get("status") {
            merge(&mut stored["status"], status);
        }
        stored["metadata"]["resourceVersion"] = json!(version);
        Ok(stored.clone())
    }

    fn list(&self, kind: Kind, namespace: &str) -> Vec<Value> {
        self.map(kind)
            .iter()
            .filter(|(key, _)| key.namespace == namespace)
            .map(|(_, value)| value.clone())
            .collect()
    }
}

/// Objects merge key by key, anything else is replaced
fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (field, value) in patch {
                merge(target.entry(field.clone()).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T> {
    Ok(serde_json::from_value(value.clone())?)
}

fn encode<T: Serialize>(obj: &T) -> Result<Value> {
    Ok(serde_json::to_value(obj)?)
}

/// Reconciler that reports each new artifact revision or generation as
/// applied and ready the first time it sees it
pub fn converge(deployment: &mut DeploymentDescriptor, source: Option<&SourceDescriptor>) {
    let Some(artifact) = source.and_then(SourceDescriptor::artifact) else {
        return;
    };
    let generation = deployment.metadata.generation;
    let status = deployment.status.get_or_insert_with(Default::default);
    if status.last_attempted_revision == artifact.revision && status.observed_generation == generation
    {
        return;
    }
    status.observed_generation = generation;
    status.last_attempted_revision.clone_from(&artifact.revision);
    status.last_applied_revision.clone_from(&artifact.revision);
    status.conditions = vec![Condition::new(
        READY,
        ConditionStatus::True,
        "ReconciliationSucceeded",
        format!("Applied revision: {}", artifact.revision),
    )];
}

/// In-memory backend for tests and local runs
pub struct MemoryBackend {
    objects: RwLock<Objects>,
    failures: RwLock<HashSet<Op>>,
    reconciler: Option<ReconcileHook>,
    finalize_reads: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// A backend without a reconciler; deployments never report status
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(Objects::default()),
            failures: RwLock::new(HashSet::new()),
            reconciler: None,
            finalize_reads: 0,
        }
    }

    /// A backend whose reconciler converges on every read
    pub fn converging() -> Self {
        Self::new().with_reconciler(Arc::new(converge))
    }

    #[must_use]
    pub fn with_reconciler(mut self, hook: ReconcileHook) -> Self {
        self.reconciler = Some(hook);
        self
    }

    /// Deleted deployments stay visible, marked for deletion, for `reads` more reads
    #[must_use]
    pub fn with_finalize_reads(mut self, reads: usize) -> Self {
        self.finalize_reads = reads;
        self
    }

    /// Make every subsequent call of `op` fail
    pub async fn fail(&self, op: Op) {
        self.failures.write().await.insert(op);
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    async fn check(&self, op: Op) -> Result<()> {
        if self.failures.read().await.contains(&op) {
            bail!("injected failure on {op:?}");
        }
        Ok(())
    }

    /// Merge raw JSON, status included, as another writer would
    pub async fn patch_deployment(&self, key: &ObjectKey, patch: Value) -> Result<()> {
        self.patch_raw(Kind::Deployment, key, &patch).await
    }

    /// Merge raw JSON, status included, as another writer would
    pub async fn patch_source(&self, key: &ObjectKey, patch: Value) -> Result<()> {
        self.patch_raw(Kind::Source, key, &patch).await
    }

    async fn patch_raw(&self, kind: Kind, key: &ObjectKey, patch: &Value) -> Result<()> {
        let mut guard = self.objects.write().await;
        let Some(stored) = guard.map_mut(kind).get_mut(key) else {
            bail!("{kind:?} {key} not found");
        };
        merge(stored, patch);
        Ok(())
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<bool> {
        let mut guard = self.objects.write().await;
        Ok(guard.map_mut(kind).remove(key).is_some())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_source(&self, key: &ObjectKey) -> Result<Option<SourceDescriptor>> {
        self.check(Op::GetSource).await?;
        let guard = self.objects.read().await;
        guard.sources.get(key).map(decode).transpose()
    }

    async fn apply_source(&self, source: &SourceDescriptor) -> Result<SourceDescriptor> {
        self.check(Op::ApplySource).await?;
        let patch = encode(source)?;
        let stored = self
            .objects
            .write()
            .await
            .apply(Kind::Source, &source.metadata.key(), patch);
        decode(&stored)
    }

    async fn apply_source_status(&self, source: &SourceDescriptor) -> Result<SourceDescriptor> {
        self.check(Op::ApplySourceStatus).await?;
        let patch = encode(source)?;
        let stored =
            self.objects
                .write()
                .await
                .apply_status(Kind::Source, &source.metadata.key(), &patch)?;
        decode(&stored)
    }

    async fn delete_source(&self, key: &ObjectKey) -> Result<bool> {
        self.check(Op::DeleteSource).await?;
        self.delete(Kind::Source, key).await
    }

    async fn list_sources(&self, namespace: &str) -> Result<Vec<SourceDescriptor>> {
        self.check(Op::ListSources).await?;
        let guard = self.objects.read().await;
        guard
            .list(Kind::Source, namespace)
            .iter()
            .map(decode)
            .collect()
    }

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<DeploymentDescriptor>> {
        self.check(Op::GetDeployment).await?;
        let mut guard = self.objects.write().await;
        let objects = &mut *guard;

        match objects.terminating.get(key).copied() {
            Some(0) => {
                objects.terminating.remove(key);
                objects.deployments.remove(key);
                return Ok(None);
            }
            Some(remaining) => {
                objects.terminating.insert(key.clone(), remaining - 1);
            }
            None => {}
        }

        let Some(stored) = objects.deployments.get_mut(key) else {
            return Ok(None);
        };
        let mut deployment: DeploymentDescriptor = decode(stored)?;

        if let Some(hook) = &self.reconciler {
            if deployment.metadata.deletion_timestamp.is_none() {
                let source_ref = &deployment.spec.source_ref;
                let namespace = if source_ref.namespace.is_empty() {
                    key.namespace.clone()
                } else {
                    source_ref.namespace.clone()
                };
                let source_key = ObjectKey::new(namespace, source_ref.name.clone());
                let source: Option<SourceDescriptor> = objects
                    .sources
                    .get(&source_key)
                    .map(decode)
                    .transpose()?;

                hook(&mut deployment, source.as_ref());
                if let Some(status) = &deployment.status {
                    stored["status"] = encode(status)?;
                }
            }
        }

        Ok(Some(deployment))
    }

    async fn apply_deployment(
        &self,
        deployment: &DeploymentDescriptor,
    ) -> Result<DeploymentDescriptor> {
        self.check(Op::ApplyDeployment).await?;
        let patch = encode(deployment)?;
        let stored =
            self.objects
                .write()
                .await
                .apply(Kind::Deployment, &deployment.metadata.key(), patch);
        decode(&stored)
    }

    async fn delete_deployment(&self, key: &ObjectKey) -> Result<bool> {
        self.check(Op::DeleteDeployment).await?;
        if self.finalize_reads == 0 {
            return self.delete(Kind::Deployment, key).await;
        }

        let mut guard = self.objects.write().await;
        let objects = &mut *guard;
        let Some(stored) = objects.deployments.get_mut(key) else {
            return Ok(false);
        };
        stored["metadata"]["deletionTimestamp"] = json!(Utc::now());
        objects
            .terminating
            .entry(key.clone())
            .or_insert(self.finalize_reads);
        Ok(true)
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentDescriptor>> {
        self.check(Op::ListDeployments).await?;
        let guard = self.objects.read().await;
        guard
            .list(Kind::Deployment, namespace)
            .iter()
            .map(decode)
            .collect()
    }
}
