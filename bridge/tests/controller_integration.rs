#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use anyhow::Result;
use flux_bridge::backend::{Backend, MemoryBackend};
use flux_bridge::storage::{ArtifactStore, StorageConfig};
use flux_bridge::{Controller, ControllerConfig};
use shared_types::ObjectKey;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const NAMESPACE: &str = "flux-system";

fn create_controller(backend: Arc<MemoryBackend>) -> Result<(Controller, TempDir)> {
    let temp_dir = TempDir::new()?;
    let store = ArtifactStore::from_config(StorageConfig::local(
        temp_dir.path(),
        ":8080",
        NAMESPACE,
        "confighub",
    ))?;
    let config = ControllerConfig::new(NAMESPACE).with_poll_interval(Duration::from_millis(10));
    Ok((Controller::new(backend, Arc::new(store), config), temp_dir))
}

#[tokio::test]
async fn test_publish_update_and_check_drift() -> Result<()> {
    let backend = Arc::new(MemoryBackend::converging());
    let (controller, dir) = create_controller(backend.clone())?;
    let cancel = CancellationToken::new();
    let key = ObjectKey::new(NAMESPACE, "foo");

    controller.apply(&cancel, "foo", "dev-1", b"Hello World").await?;
    let first = backend
        .get_source(&key)
        .await?
        .and_then(|s| s.artifact().cloned())
        .expect("artifact recorded on the source");
    assert_eq!(first.path, "flux-system/confighub/foo/dev-1.tar.gz");
    assert_eq!(
        first.url,
        "http://localhost:8080/flux-system/confighub/foo/dev-1.tar.gz"
    );
    assert_eq!(
        first.size,
        Some(std::fs::metadata(dir.path().join(&first.path))?.len())
    );

    // Publishing the same payload elsewhere yields the same digest
    let (other, _other_dir) = create_controller(Arc::new(MemoryBackend::converging()))?;
    other.apply(&cancel, "foo", "dev-1", b"Hello World").await?;
    let same = other.store().list("foo").await?;
    assert_eq!(same.len(), 1);

    controller
        .apply(&cancel, "foo", "dev-2", b"Hello World Updated")
        .await?;
    let second = backend
        .get_source(&key)
        .await?
        .and_then(|s| s.artifact().cloned())
        .expect("artifact recorded on the source");
    assert_ne!(first.digest, second.digest);
    assert!(!dir.path().join(&first.path).exists());
    assert!(dir.path().join(&second.path).exists());

    let drift = controller
        .diff(&cancel, "foo", b"Hello World Updated")
        .await?;
    assert!(!drift.drifted);
    assert_eq!(drift.message, "No drift detected");

    Ok(())
}

#[tokio::test]
async fn test_never_applied_unit() -> Result<()> {
    let (controller, _dir) = create_controller(Arc::new(MemoryBackend::converging()))?;
    let cancel = CancellationToken::new();

    let drift = controller.diff(&cancel, "missing", b"data").await?;
    assert!(drift.drifted);
    assert_eq!(drift.message, "Kustomization missing could not be found");

    controller.delete(&cancel, "missing").await?;
    Ok(())
}

#[tokio::test]
async fn test_units_are_independent() -> Result<()> {
    let backend = Arc::new(MemoryBackend::converging().with_finalize_reads(2));
    let (controller, _dir) = create_controller(backend)?;
    let cancel = CancellationToken::new();

    controller.apply(&cancel, "foo", "dev-1", b"foo").await?;
    controller.apply(&cancel, "bar", "dev-7", b"bar").await?;
    assert_eq!(controller.list().await?, vec!["bar", "foo"]);

    controller.delete(&cancel, "foo").await?;
    assert_eq!(controller.list().await?, vec!["bar"]);
    assert!(controller.store().list("foo").await?.is_empty());

    let drift = controller.diff(&cancel, "bar", b"bar").await?;
    assert!(!drift.drifted);
    Ok(())
}
