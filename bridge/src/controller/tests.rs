use super::*;
use crate::backend::{MemoryBackend, Op, ReconcileHook};
use crate::error::ApplyPhase;
use crate::storage::StorageConfig;
use serde_json::json;
use shared_types::condition::{READY, STALLED};
use shared_types::{Condition, ConditionStatus, DeploymentDescriptor, SourceDescriptor};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const NAMESPACE: &str = "flux-system";

struct Harness {
    controller: Controller,
    backend: Arc<MemoryBackend>,
    dir: TempDir,
}

fn harness(backend: MemoryBackend) -> Harness {
    harness_with(backend, |config| config)
}

fn harness_with(
    backend: MemoryBackend,
    configure: impl FnOnce(ControllerConfig) -> ControllerConfig,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::from_config(StorageConfig::local(
        dir.path(),
        ":8080",
        NAMESPACE,
        "confighub",
    ))
    .unwrap();
    let backend = Arc::new(backend);
    let config = configure(
        ControllerConfig::new(NAMESPACE)
            .with_poll_interval(Duration::from_millis(10))
            .with_deploy_timeout(Duration::from_millis(300)),
    );
    let controller = Controller::new(backend.clone(), Arc::new(store), config);
    Harness {
        controller,
        backend,
        dir,
    }
}

fn reconciler(
    f: impl Fn(&mut DeploymentDescriptor, Option<&SourceDescriptor>) + Send + Sync + 'static,
) -> ReconcileHook {
    Arc::new(f)
}

fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}

#[tokio::test]
async fn test_apply_update_and_diff_scenario() {
    let h = harness(MemoryBackend::converging());
    let cancel = CancellationToken::new();

    h.controller
        .apply(&cancel, "foo", "dev-1", b"Hello World")
        .await
        .unwrap();
    let source = h.backend.get_source(&key("foo")).await.unwrap().unwrap();
    let first = source.artifact().unwrap().clone();
    assert_eq!(first.path, "flux-system/confighub/foo/dev-1.tar.gz");
    let on_disk = std::fs::read(h.dir.path().join(&first.path)).unwrap();
    assert_eq!(first.size, Some(on_disk.len() as u64));

    h.controller
        .apply(&cancel, "foo", "dev-2", b"Hello World Updated")
        .await
        .unwrap();
    let source = h.backend.get_source(&key("foo")).await.unwrap().unwrap();
    let second = source.artifact().unwrap().clone();
    assert_eq!(second.path, "flux-system/confighub/foo/dev-2.tar.gz");
    assert_ne!(first.digest, second.digest);
    assert!(!h.dir.path().join(&first.path).exists());

    let stored = h.controller.store().list("foo").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].path, second.path);

    let drift = h
        .controller
        .diff(&cancel, "foo", b"Hello World Updated")
        .await
        .unwrap();
    assert!(!drift.drifted);
    assert_eq!(drift.message, "No drift detected");

    let drift = h.controller.diff(&cancel, "foo", b"Hello World").await.unwrap();
    assert!(drift.drifted);
    assert_eq!(
        drift.message,
        "External Artifact current data does not match expected data"
    );
}

#[tokio::test]
async fn test_apply_labels_and_configures_descriptors() {
    let h = harness(MemoryBackend::converging());
    let cancel = CancellationToken::new();

    h.controller.apply(&cancel, "foo", "dev-1", b"data").await.unwrap();

    let source = h.backend.get_source(&key("foo")).await.unwrap().unwrap();
    let ready = source.status.as_ref().unwrap().conditions[0].clone();
    assert_eq!(ready.type_, READY);
    assert_eq!(ready.message, "Artifact is ready");
    assert_eq!(
        source.metadata.labels.get(shared_types::MANAGED_BY_LABEL).map(String::as_str),
        Some("flux-bridge")
    );

    let deployment = h.backend.get_deployment(&key("foo")).await.unwrap().unwrap();
    assert_eq!(deployment.spec.source_ref.kind, "ExternalArtifact");
    assert_eq!(deployment.spec.source_ref.name, "foo");
    assert_eq!(deployment.spec.source_ref.namespace, NAMESPACE);
    assert!(deployment.spec.wait);
    assert!(deployment.spec.prune);
    assert_eq!(deployment.spec.interval, Duration::from_secs(60));
    assert_eq!(deployment.spec.timeout, Some(Duration::from_millis(300)));

    assert_eq!(h.controller.list().await.unwrap(), vec!["foo".to_string()]);
}

#[tokio::test]
async fn test_apply_rejects_empty_arguments_without_side_effects() {
    let h = harness(MemoryBackend::converging());
    let cancel = CancellationToken::new();

    for (name, revision, content) in [
        ("", "dev-1", b"data".as_slice()),
        ("foo", "", b"data".as_slice()),
        ("foo", "dev-1", b"".as_slice()),
    ] {
        let err = h
            .controller
            .apply(&cancel, name, revision, content)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)), "{err}");
    }

    assert!(h.controller.list().await.unwrap().is_empty());
    assert!(h.controller.store().list("foo").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_apply_bad_name_is_invalid_argument() {
    let h = harness(MemoryBackend::converging());
    let err = h
        .controller
        .apply(&CancellationToken::new(), "../foo", "dev-1", b"data")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_apply_fails_fast_on_stall() {
    let hook = reconciler(|deployment, _| {
        let status = deployment.status.get_or_insert_with(Default::default);
        status.conditions = vec![Condition::new(
            STALLED,
            ConditionStatus::True,
            "HealthCheckFailed",
            "health check failed",
        )];
    });
    let h = harness(MemoryBackend::new().with_reconciler(hook));

    let started = std::time::Instant::now();
    let err = h
        .controller
        .apply(&CancellationToken::new(), "foo", "dev-1", b"data")
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(ApplyPhase::Convergence));
    match err.root() {
        BridgeError::ConvergenceStalled(message) => assert_eq!(message, "health check failed"),
        other => panic!("expected stall, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_millis(300));
}

#[tokio::test]
async fn test_apply_failed_readiness_is_unexpected_status() {
    let hook = reconciler(|deployment, source| {
        let revision = source
            .and_then(SourceDescriptor::artifact)
            .map(|a| a.revision.clone())
            .unwrap_or_default();
        let status = deployment.status.get_or_insert_with(Default::default);
        status.last_attempted_revision = revision;
        status.conditions = vec![Condition::new(
            READY,
            ConditionStatus::False,
            "BuildFailed",
            "kustomize build failed",
        )];
    });
    let h = harness(MemoryBackend::new().with_reconciler(hook));

    let err = h
        .controller
        .apply(&CancellationToken::new(), "foo", "dev-1", b"data")
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(ApplyPhase::Convergence));
    assert!(matches!(err.root(), BridgeError::UnexpectedStatus(_)), "{err}");
}

#[tokio::test]
async fn test_apply_times_out_when_never_ready() {
    let h = harness(MemoryBackend::new());

    let err = h
        .controller
        .apply(&CancellationToken::new(), "foo", "dev-1", b"data")
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(ApplyPhase::Convergence));
    match err.root() {
        BridgeError::ConvergenceTimeout { name, revision, .. } => {
            assert_eq!(name, "foo");
            assert_eq!(revision, "dev-1");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    // The new artifact stays in place for the next apply to supersede
    assert_eq!(h.controller.store().list("foo").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_apply_waits_for_new_revision() {
    // Reports the previous revision for a few reads before picking up the new one
    let reads = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = reads.clone();
    let hook = reconciler(move |deployment, source| {
        let seen = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if seen < 3 {
            let status = deployment.status.get_or_insert_with(Default::default);
            status.last_attempted_revision = "dev-0".to_string();
            status.conditions = vec![Condition::new(READY, ConditionStatus::True, "", "")];
            return;
        }
        crate::backend::converge(deployment, source);
    });
    let h = harness(MemoryBackend::new().with_reconciler(hook));

    h.controller
        .apply(&CancellationToken::new(), "foo", "dev-1", b"data")
        .await
        .unwrap();

    assert!(reads.load(std::sync::atomic::Ordering::SeqCst) > 3);
    let deployment = h.backend.get_deployment(&key("foo")).await.unwrap().unwrap();
    assert_eq!(deployment.last_applied_revision(), "dev-1");
}

#[tokio::test]
async fn test_apply_cancelled_while_waiting() {
    let h = harness(MemoryBackend::new());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = h
        .controller
        .apply(&cancel, "foo", "dev-1", b"data")
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.phase(), Some(ApplyPhase::Convergence));
}

#[tokio::test]
async fn test_apply_backend_failure_is_tagged_with_phase() {
    let h = harness(MemoryBackend::converging());
    h.backend.fail(Op::ApplySourceStatus).await;

    let err = h
        .controller
        .apply(&CancellationToken::new(), "foo", "dev-1", b"data")
        .await
        .unwrap_err();
    assert_eq!(err.phase(), Some(ApplyPhase::Source));
    assert!(matches!(err.root(), BridgeError::BackendIo(_)));

    h.backend.clear_failures().await;
    h.backend.fail(Op::ApplyDeployment).await;
    let err = h
        .controller
        .apply(&CancellationToken::new(), "foo", "dev-1", b"data")
        .await
        .unwrap_err();
    assert_eq!(err.phase(), Some(ApplyPhase::Deployment));
}

#[tokio::test]
async fn test_apply_backend_failure_while_waiting_is_convergence_error() {
    let h = harness(MemoryBackend::converging());
    h.backend.fail(Op::GetDeployment).await;

    let err = h
        .controller
        .apply(&CancellationToken::new(), "foo", "dev-1", b"data")
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(ApplyPhase::Convergence));
    assert!(matches!(err.root(), BridgeError::BackendIo(_)));
}

#[tokio::test]
async fn test_apply_fails_when_garbage_collection_fails() {
    let h = harness_with(MemoryBackend::converging(), |config| {
        config.with_gc_timeout(Duration::ZERO)
    });

    let err = h
        .controller
        .apply(&CancellationToken::new(), "foo", "dev-1", b"data")
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(ApplyPhase::GarbageCollect));
    assert!(matches!(err.root(), BridgeError::StorageIo(_)));

    let deployment = h.backend.get_deployment(&key("foo")).await.unwrap().unwrap();
    assert_eq!(deployment.last_applied_revision(), "dev-1");
}

#[tokio::test]
async fn test_apply_then_diff_opaque_revisions() {
    let h = harness(MemoryBackend::converging());
    let cancel = CancellationToken::new();

    for revision in ["1.0.0+build.5", "main@sha1:abc123", "rev 7"] {
        h.controller
            .apply(&cancel, "foo", revision, b"Hello World")
            .await
            .unwrap();

        let drift = h.controller.diff(&cancel, "foo", b"Hello World").await.unwrap();
        assert!(!drift.drifted, "{revision:?}: {}", drift.message);
    }

    let stored = h.controller.store().list("foo").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].path, "flux-system/confighub/foo/rev 7.tar.gz");
}

#[tokio::test]
async fn test_apply_preserves_fields_of_other_writers() {
    let h = harness(MemoryBackend::converging());
    let cancel = CancellationToken::new();

    h.controller.apply(&cancel, "foo", "dev-1", b"one").await.unwrap();
    h.backend
        .patch_deployment(
            &key("foo"),
            json!({
                "metadata": {"labels": {"team": "payments"}},
                "spec": {"path": "./overlays/prod"}
            }),
        )
        .await
        .unwrap();

    h.controller.apply(&cancel, "foo", "dev-2", b"two").await.unwrap();

    let deployment = h.backend.get_deployment(&key("foo")).await.unwrap().unwrap();
    assert_eq!(
        deployment.metadata.labels.get("team").map(String::as_str),
        Some("payments")
    );
    assert_eq!(deployment.spec.path, "./overlays/prod");
    assert_eq!(deployment.last_applied_revision(), "dev-2");
}

#[tokio::test]
async fn test_diff_never_applied() {
    let h = harness(MemoryBackend::converging());
    let drift = h
        .controller
        .diff(&CancellationToken::new(), "foo", b"data")
        .await
        .unwrap();
    assert!(drift.drifted);
    assert_eq!(drift.message, "Kustomization foo could not be found");
}

#[tokio::test]
async fn test_diff_reports_each_kind_of_drift() {
    let h = harness(MemoryBackend::converging());
    let cancel = CancellationToken::new();
    h.controller.apply(&cancel, "foo", "dev-1", b"data").await.unwrap();

    // Revision mismatch
    h.backend
        .patch_deployment(&key("foo"), json!({"status": {"lastAppliedRevision": "dev-0"}}))
        .await
        .unwrap();
    let drift = h.controller.diff(&cancel, "foo", b"data").await.unwrap();
    assert_eq!(
        drift.message,
        "External Artifact revision does not match Kustomization last applied revision"
    );

    // Missing blob
    let source = h.backend.get_source(&key("foo")).await.unwrap().unwrap();
    std::fs::remove_file(h.dir.path().join(&source.artifact().unwrap().path)).unwrap();
    let drift = h.controller.diff(&cancel, "foo", b"data").await.unwrap();
    assert_eq!(drift.message, "Artifact does not exist on disk");

    // Empty status
    h.backend
        .patch_source(&key("foo"), json!({"status": {"artifact": null}}))
        .await
        .unwrap();
    let drift = h.controller.diff(&cancel, "foo", b"data").await.unwrap();
    assert_eq!(drift.message, "External Artifact status is empty");

    // Missing source
    h.backend.delete_source(&key("foo")).await.unwrap();
    let drift = h.controller.diff(&cancel, "foo", b"data").await.unwrap();
    assert!(drift.drifted);
    assert_eq!(drift.message, "External Artifact foo could not be found");
}

#[tokio::test]
async fn test_diff_cancelled() {
    let h = harness(MemoryBackend::converging());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h.controller.diff(&cancel, "foo", b"data").await.unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_diff_backend_error_aborts() {
    let h = harness(MemoryBackend::converging());
    h.backend.fail(Op::GetDeployment).await;

    let err = h
        .controller
        .diff(&CancellationToken::new(), "foo", b"data")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::BackendIo(_)));
}

#[tokio::test]
async fn test_delete_never_applied() {
    let h = harness(MemoryBackend::converging());
    h.controller
        .delete(&CancellationToken::new(), "foo")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_removes_everything_and_is_idempotent() {
    let h = harness(MemoryBackend::converging().with_finalize_reads(3));
    let cancel = CancellationToken::new();
    h.controller.apply(&cancel, "foo", "dev-1", b"data").await.unwrap();
    h.controller.apply(&cancel, "bar", "dev-1", b"data").await.unwrap();

    h.controller.delete(&cancel, "foo").await.unwrap();

    assert!(h.backend.get_deployment(&key("foo")).await.unwrap().is_none());
    assert!(h.backend.get_source(&key("foo")).await.unwrap().is_none());
    assert!(h.controller.store().list("foo").await.unwrap().is_empty());
    assert_eq!(h.controller.store().list("bar").await.unwrap().len(), 1);
    assert_eq!(h.controller.list().await.unwrap(), vec!["bar".to_string()]);

    h.controller.delete(&cancel, "foo").await.unwrap();

    let drift = h.controller.diff(&cancel, "foo", b"data").await.unwrap();
    assert_eq!(drift.message, "Kustomization foo could not be found");
}

#[tokio::test]
async fn test_delete_cancelled_while_finalizing() {
    let h = harness(MemoryBackend::converging().with_finalize_reads(usize::MAX));
    let cancel = CancellationToken::new();
    h.controller.apply(&cancel, "foo", "dev-1", b"data").await.unwrap();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = h.controller.delete(&cancel, "foo").await.unwrap_err();
    assert!(matches!(err, BridgeError::Cancelled));
    // The source is only removed once the deployment is gone
    assert!(h.backend.get_source(&key("foo")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_backend_error_aborts() {
    let h = harness(MemoryBackend::converging());
    h.backend.fail(Op::DeleteDeployment).await;

    let err = h
        .controller
        .delete(&CancellationToken::new(), "foo")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::BackendIo(_)));
}

#[tokio::test]
async fn test_connect_checks_backend() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        ArtifactStore::from_config(StorageConfig::local(dir.path(), ":8080", NAMESPACE, "confighub"))
            .unwrap(),
    );

    let healthy = Arc::new(MemoryBackend::new());
    assert!(
        Controller::connect(healthy, store.clone(), ControllerConfig::new(NAMESPACE))
            .await
            .is_ok()
    );

    let broken = Arc::new(MemoryBackend::new());
    broken.fail(Op::ListDeployments).await;
    let result = Controller::connect(broken, store, ControllerConfig::new(NAMESPACE)).await;
    assert!(matches!(result, Err(BridgeError::BackendIo(_))));
}
