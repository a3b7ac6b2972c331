use backstore::exec::MountingPodInvoker;
use backstore::router::SnapshotRouter;
use backstore::test_utils::fixtures::storage_secret;
use backstore::test_utils::k8s::MockK8sClient;
use backstore::test_utils::store::MemorySnapshotStore;
use backstore::types::Repository;
use backstore_config::shared::ExecConfig;
use kube::ResourceExt;
use std::sync::Arc;
use tempfile::TempDir;

/// Repository string of `test_utils::fixtures::local_repository`.
pub const LOCAL_TARGET: &str = "/safe/data";

/// Repository string of `test_utils::fixtures::s3_repository("ns", "r1")`.
pub const S3_TARGET: &str = "s3:minio:9000/bucket/r1";

/// A router wired to in-memory collaborators, with scratch directories kept
/// under a dedicated root so tests can check they are cleaned up.
pub struct TestRouter {
    pub k8s: MockK8sClient,
    pub store: MemorySnapshotStore,
    pub router: SnapshotRouter<MemorySnapshotStore, MountingPodInvoker>,
    pub scratch_root: TempDir,
}

impl TestRouter {
    /// Registers `repository` and its storage secret with the cluster.
    pub async fn register(&self, repository: &Repository) {
        let namespace = repository.namespace().unwrap_or_default();
        self.k8s
            .add_secret(storage_secret(&namespace, &repository.name_any()))
            .await;
        self.k8s.add_repository(repository.clone()).await;
    }

    /// Number of entries left under the scratch root.
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch_root.path())
            .map(|entries| entries.count())
            .unwrap_or_default()
    }
}

pub fn spawn_router() -> TestRouter {
    let k8s = MockK8sClient::new();
    let store = MemorySnapshotStore::new();
    let scratch_root = tempfile::tempdir().unwrap();

    let invoker = MountingPodInvoker::new(Arc::new(k8s.clone()), ExecConfig::default());
    let router = SnapshotRouter::new(
        Arc::new(k8s.clone()),
        store.clone(),
        invoker,
        Some(scratch_root.path().to_path_buf()),
    );

    TestRouter {
        k8s,
        store,
        router,
        scratch_root,
    }
}
