use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use reqwest::Url;
use shared_types::Artifact;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::archive;
use super::config::StorageConfig;
use crate::error::{BridgeError, Result};

/// Name of the single file inside every artifact archive
pub const DATA_FILE_NAME: &str = "data.yaml";

/// A blob currently held in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub path: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Content-addressed artifact storage on top of an object store.
///
/// Blobs are laid out as `<namespace>/<owner>/<name>/<revision>.tar.gz`
/// below the configured root, which is also what the artifact server
/// exposes over HTTP.
pub struct ArtifactStore {
    store: Arc<dyn ObjectStore>,
    config: StorageConfig,
}

fn storage_err(err: impl Into<anyhow::Error>) -> BridgeError {
    BridgeError::StorageIo(err.into())
}

/// Rejects values that would escape or break the artifact path layout
pub fn validate_segment(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(BridgeError::InvalidArgument(format!("{field} can't be empty")));
    }
    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid_chars || value == "." || value == ".." {
        return Err(BridgeError::InvalidArgument(format!(
            "{field} {value:?} is not a valid path segment"
        )));
    }
    Ok(())
}

/// Revisions are opaque. Only values that can't name a single file are refused.
fn validate_revision(revision: &str) -> Result<()> {
    if revision.is_empty() {
        return Err(BridgeError::InvalidArgument("revision can't be empty".to_string()));
    }
    if revision.contains(['/', '\0']) || revision == "." || revision == ".." {
        return Err(BridgeError::InvalidArgument(format!(
            "revision {revision:?} can't be used as a file name"
        )));
    }
    Ok(())
}

impl ArtifactStore {
    pub fn from_config(config: StorageConfig) -> Result<Self> {
        validate_segment("namespace", &config.namespace)?;
        validate_segment("owner", &config.owner)?;
        std::fs::create_dir_all(&config.path).map_err(storage_err)?;
        let store = LocalFileSystem::new_with_prefix(&config.path).map_err(storage_err)?;
        Ok(Self {
            store: Arc::new(store),
            config,
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn artifact_dir(&self, name: &str) -> String {
        format!("{}/{}/{}", self.config.namespace, self.config.owner, name)
    }

    pub fn artifact_path(&self, name: &str, revision: &str) -> String {
        format!("{}/{}.tar.gz", self.artifact_dir(name), revision)
    }

    /// HTTP URL of a storage path, each segment percent-encoded
    pub fn artifact_url(&self, path: &str) -> Result<String> {
        let address = &self.config.advertised_address;
        let mut url = Url::parse(&format!("http://{address}/")).map_err(|e| {
            BridgeError::InvalidArgument(format!("advertised address {address:?}: {e}"))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                BridgeError::InvalidArgument(format!("advertised address {address:?} has no path"))
            })?
            .pop_if_empty()
            .extend(path.split('/'));
        Ok(url.into())
    }

    /// Archive `content` as the artifact for `name` at `revision`
    pub async fn create(&self, name: &str, revision: &str, content: &[u8]) -> Result<Artifact> {
        validate_segment("name", name)?;
        validate_revision(revision)?;

        let archive = archive::build(DATA_FILE_NAME, content).map_err(storage_err)?;
        let digest = archive::digest(&archive);
        let size = archive.len() as u64;
        let path = self.artifact_path(name, revision);

        self.store
            .put(&Path::from(path.as_str()), PutPayload::from(archive))
            .await
            .map_err(storage_err)?;
        debug!("Archived {} ({} bytes, {})", path, size, digest);

        Ok(Artifact {
            url: self.artifact_url(&path)?,
            path,
            revision: revision.to_string(),
            digest,
            last_update_time: Utc::now(),
            size: Some(size),
        })
    }

    pub async fn exists(&self, artifact: &Artifact) -> Result<bool> {
        match self.store.head(&Path::from(artifact.path.as_str())).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Read one file out of an artifact's archive
    pub async fn fetch(&self, artifact: &Artifact, file_name: &str) -> Result<Vec<u8>> {
        let location = Path::from(artifact.path.as_str());
        let bytes = match self.store.get(&location).await {
            Ok(result) => result.bytes().await.map_err(storage_err)?,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(storage_err(anyhow!(
                    "artifact {} does not exist",
                    artifact.path
                )));
            }
            Err(e) => return Err(storage_err(e)),
        };

        archive::extract(&bytes, file_name)
            .map_err(storage_err)?
            .ok_or_else(|| {
                storage_err(anyhow!(
                    "artifact {} has no file {}",
                    artifact.path,
                    file_name
                ))
            })
    }

    /// All blobs retained for `name`, sorted by path
    pub async fn list(&self, name: &str) -> Result<Vec<StoredArtifact>> {
        validate_segment("name", name)?;
        self.list_dir(&self.artifact_dir(name)).await
    }

    async fn list_dir(&self, dir: &str) -> Result<Vec<StoredArtifact>> {
        let prefix = Path::from(dir);
        let metas: Vec<_> = self
            .store
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(storage_err)?;

        let mut stored: Vec<StoredArtifact> = metas
            .into_iter()
            .map(|meta| StoredArtifact {
                path: meta.location.to_string(),
                size: u64::try_from(meta.size).unwrap_or(u64::MAX),
                last_modified: meta.last_modified,
            })
            .collect();
        stored.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(stored)
    }

    async fn delete_path(&self, path: &str) -> Result<bool> {
        match self.store.delete(&Path::from(path)).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Remove every blob of `name` except `keep`.
    ///
    /// Blobs modified within the retention TTL are left for a later pass.
    /// The whole sweep is bounded by `timeout`.
    pub async fn garbage_collect(
        &self,
        name: &str,
        keep: &Artifact,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        validate_segment("name", name)?;
        let dir = self.artifact_dir(name);
        let ttl = self.config.retention_ttl;

        let sweep = async {
            let cutoff =
                Utc::now() - chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
            let keep = Path::from(keep.path.as_str()).to_string();
            let mut removed = Vec::new();
            for stored in self.list_dir(&dir).await? {
                if stored.path == keep {
                    continue;
                }
                if !ttl.is_zero() && stored.last_modified > cutoff {
                    debug!("Retaining {} until it exceeds the retention TTL", stored.path);
                    continue;
                }
                if self.delete_path(&stored.path).await? {
                    removed.push(stored.path);
                }
            }
            Ok::<_, BridgeError>(removed)
        };

        let removed = tokio::time::timeout(timeout, sweep).await.map_err(|_| {
            storage_err(anyhow!(
                "garbage collection of {dir} did not finish within {timeout:?}"
            ))
        })??;

        if !removed.is_empty() {
            info!("Garbage collected {} artifact(s) for {}", removed.len(), dir);
        }
        Ok(removed)
    }

    /// Remove every blob in the artifact's directory. Missing blobs are fine.
    pub async fn remove_all(&self, artifact: &Artifact) -> Result<usize> {
        let dir = artifact.dir();
        let root = format!("{}/{}/", self.config.namespace, self.config.owner);
        let name = dir.strip_prefix(&root).unwrap_or_default();
        if validate_segment("name", name).is_err() {
            warn!("Not removing {}: outside of {}", artifact.path, root);
            return Ok(0);
        }

        let mut removed = 0;
        for stored in self.list_dir(dir).await? {
            if self.delete_path(&stored.path).await? {
                removed += 1;
            }
        }
        debug!("Removed {} blob(s) under {}", removed, dir);
        Ok(removed)
    }
}
