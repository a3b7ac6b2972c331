use backstore_config::shared::SnapshotAccessConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::resolve_backend_target;
use crate::error::{ErrorKind, SnapshotResult};
use crate::exec::{MountingPodInvoker, RemoteInvoker, Verb};
use crate::k8s::K8sClient;
use crate::snapshot_error;
use crate::store::{ResticStore, SnapshotStore, is_repository_not_found};
use crate::types::{Repository, Snapshot};

/// How a request reaches a repository's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPath {
    /// The backend client runs in this process.
    Direct,
    /// The request is executed inside the pod that mounts the local volume.
    MountingPod,
}

impl AccessPath {
    /// A local volume is only visible to pods that mount it, so callers outside
    /// the cluster go through the mounting pod. Everything else is direct.
    pub fn for_request(repository: &Repository, in_cluster: bool) -> AccessPath {
        if repository.local_backend().is_some() && !in_cluster {
            AccessPath::MountingPod
        } else {
            AccessPath::Direct
        }
    }
}

/// Public entry point for listing and forgetting snapshots.
///
/// Every call resolves secrets and checks repository existence from scratch;
/// nothing is cached between calls.
pub struct SnapshotRouter<S, R> {
    k8s: Arc<dyn K8sClient>,
    store: S,
    invoker: R,
    scratch_root: Option<PathBuf>,
}

impl SnapshotRouter<ResticStore, MountingPodInvoker> {
    /// Builds the production router: restic for direct access, pod exec for
    /// local volumes.
    pub fn from_config(
        k8s: Arc<dyn K8sClient>,
        config: &SnapshotAccessConfig,
    ) -> SnapshotRouter<ResticStore, MountingPodInvoker> {
        let store = ResticStore::new(config.restic.clone());
        let invoker = MountingPodInvoker::new(k8s.clone(), config.exec.clone());

        SnapshotRouter::new(k8s, store, invoker, config.restic.scratch_root.clone())
    }
}

impl<S, R> SnapshotRouter<S, R>
where
    S: SnapshotStore,
    R: RemoteInvoker,
{
    pub fn new(
        k8s: Arc<dyn K8sClient>,
        store: S,
        invoker: R,
        scratch_root: Option<PathBuf>,
    ) -> SnapshotRouter<S, R> {
        SnapshotRouter {
            k8s,
            store,
            invoker,
            scratch_root,
        }
    }

    /// Lists the snapshots of `repository` whose ID starts with one of
    /// `snapshot_ids`, or all of them when `snapshot_ids` is empty.
    ///
    /// A repository that was never initialized has no snapshots.
    pub async fn list_snapshots(
        &self,
        repository: &Repository,
        snapshot_ids: &[String],
        in_cluster: bool,
    ) -> SnapshotResult<Vec<Snapshot>> {
        let path = AccessPath::for_request(repository, in_cluster);
        debug!(repository = %repository.qualified_name(), ?path, "listing snapshots");

        let result = match path {
            AccessPath::Direct => self.list_direct(repository, snapshot_ids).await,
            AccessPath::MountingPod => self.list_in_mounting_pod(repository, snapshot_ids).await,
        };

        result.map_err(|err| {
            err.with_context(format!(
                "listing snapshots of {}",
                repository.qualified_name()
            ))
        })
    }

    /// Forgets the given snapshots of `repository`.
    ///
    /// IDs that are not present, an empty ID list and a repository that was
    /// never initialized are all no-ops.
    pub async fn forget_snapshots(
        &self,
        repository: &Repository,
        snapshot_ids: &[String],
        in_cluster: bool,
    ) -> SnapshotResult<()> {
        if snapshot_ids.is_empty() {
            debug!(repository = %repository.qualified_name(), "no snapshots to forget");
            return Ok(());
        }

        let path = AccessPath::for_request(repository, in_cluster);
        info!(
            repository = %repository.qualified_name(),
            ?path,
            snapshots = ?snapshot_ids,
            "forgetting snapshots"
        );

        let result = match path {
            AccessPath::Direct => self.forget_direct(repository, snapshot_ids).await,
            AccessPath::MountingPod => self
                .invoker
                .invoke(repository, Verb::Forget, snapshot_ids)
                .await
                .map(|_| ()),
        };

        result.map_err(|err| {
            err.with_context(format!(
                "forgetting snapshots of {}",
                repository.qualified_name()
            ))
        })
    }

    async fn list_direct(
        &self,
        repository: &Repository,
        snapshot_ids: &[String],
    ) -> SnapshotResult<Vec<Snapshot>> {
        // Dropping the target at the end of this scope removes its scratch directory.
        let target =
            resolve_backend_target(self.k8s.as_ref(), repository, self.scratch_root.as_deref())
                .await?;

        if !self.store.repository_exists(&target).await {
            debug!(repository = %target.repository(), "repository not initialized");
            return Ok(Vec::new());
        }

        let snapshots = match self.store.list_snapshots(&target, snapshot_ids).await {
            Ok(snapshots) => snapshots,
            Err(err)
                if is_repository_not_found(
                    &target.repository(),
                    err.detail().unwrap_or_default(),
                ) =>
            {
                debug!(repository = %target.repository(), "repository vanished while listing");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        Ok(snapshots
            .into_iter()
            .map(|snapshot| Snapshot::from_backend(repository, snapshot))
            .collect())
    }

    async fn list_in_mounting_pod(
        &self,
        repository: &Repository,
        snapshot_ids: &[String],
    ) -> SnapshotResult<Vec<Snapshot>> {
        let stdout = self
            .invoker
            .invoke(repository, Verb::Snapshots, snapshot_ids)
            .await?;

        serde_json::from_slice(&stdout).map_err(|err| {
            snapshot_error!(
                ErrorKind::DeserializationError,
                "Mounting pod returned malformed snapshot list",
                err
            )
        })
    }

    async fn forget_direct(
        &self,
        repository: &Repository,
        snapshot_ids: &[String],
    ) -> SnapshotResult<()> {
        let target =
            resolve_backend_target(self.k8s.as_ref(), repository, self.scratch_root.as_deref())
                .await?;

        if !self.store.repository_exists(&target).await {
            debug!(repository = %target.repository(), "repository not initialized");
            return Ok(());
        }

        self.store.delete_snapshots(&target, snapshot_ids).await
    }
}
