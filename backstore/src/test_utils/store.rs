use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::backend::BackendTarget;
use crate::bail;
use crate::error::{ErrorKind, SnapshotError, SnapshotResult};
use crate::snapshot_error;
use crate::store::{SnapshotStore, format_command_failure, is_selected, resolve_forget_ids};
use crate::types::BackendSnapshot;

/// An operation received by [`MemorySnapshotStore`], with the repository string
/// of its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Exists(String),
    List(String, Vec<String>),
    Delete(String, Vec<String>),
}

#[derive(Debug, Default)]
struct Inner {
    repositories: HashMap<String, Vec<BackendSnapshot>>,
    list_failure: Option<String>,
    calls: Vec<StoreCall>,
    scratch_dirs: Vec<PathBuf>,
}

/// [`SnapshotStore`] keeping repositories in memory, keyed by repository string.
///
/// Listing or deleting in a repository that does not exist fails the way the
/// backend client does, with the repository string as the failure reason.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySnapshotStore {
    pub fn new() -> MemorySnapshotStore {
        MemorySnapshotStore::default()
    }

    /// Initializes an empty repository.
    pub async fn create_repository(&self, repository: &str) {
        let mut inner = self.inner.lock().await;
        inner.repositories.entry(repository.to_owned()).or_default();
    }

    pub async fn remove_repository(&self, repository: &str) {
        let mut inner = self.inner.lock().await;
        inner.repositories.remove(repository);
    }

    pub async fn add_snapshot(&self, repository: &str, snapshot: BackendSnapshot) {
        let mut inner = self.inner.lock().await;
        inner
            .repositories
            .entry(repository.to_owned())
            .or_default()
            .push(snapshot);
    }

    /// Makes every subsequent listing fail with `message` as error detail.
    pub async fn fail_list_with(&self, message: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        inner.list_failure = Some(message.into());
    }

    pub async fn snapshot_ids(&self, repository: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .repositories
            .get(repository)
            .map(|snapshots| snapshots.iter().map(|s| s.id.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        let inner = self.inner.lock().await;
        inner.calls.clone()
    }

    /// Scratch directories of every target this store was called with.
    pub async fn scratch_dirs(&self) -> Vec<PathBuf> {
        let inner = self.inner.lock().await;
        inner.scratch_dirs.clone()
    }

    async fn record(&self, target: &BackendTarget, call: StoreCall) {
        let mut inner = self.inner.lock().await;
        inner.calls.push(call);
        inner.scratch_dirs.push(target.scratch_dir().to_path_buf());
    }
}

fn repository_missing(repository: &str) -> SnapshotError {
    let stderr = format!(
        "Fatal: unable to open config file\nIs there a repository at the following location?\n{repository}\n"
    );

    snapshot_error!(
        ErrorKind::BackendCommandFailed,
        "Backend client command failed",
        format_command_failure(Some(1), &stderr)
    )
}

impl SnapshotStore for MemorySnapshotStore {
    async fn repository_exists(&self, target: &BackendTarget) -> bool {
        let repository = target.repository();
        self.record(target, StoreCall::Exists(repository.clone())).await;

        let inner = self.inner.lock().await;
        inner.repositories.contains_key(&repository)
    }

    async fn list_snapshots(
        &self,
        target: &BackendTarget,
        snapshot_ids: &[String],
    ) -> SnapshotResult<Vec<BackendSnapshot>> {
        let repository = target.repository();
        self.record(target, StoreCall::List(repository.clone(), snapshot_ids.to_vec()))
            .await;

        let inner = self.inner.lock().await;
        if let Some(message) = &inner.list_failure {
            bail!(
                ErrorKind::BackendCommandFailed,
                "Backend client command failed",
                message
            );
        }

        let Some(snapshots) = inner.repositories.get(&repository) else {
            return Err(repository_missing(&repository));
        };

        Ok(snapshots
            .iter()
            .filter(|snapshot| is_selected(snapshot, snapshot_ids))
            .cloned()
            .collect())
    }

    async fn delete_snapshots(
        &self,
        target: &BackendTarget,
        snapshot_ids: &[String],
    ) -> SnapshotResult<()> {
        let repository = target.repository();
        self.record(
            target,
            StoreCall::Delete(repository.clone(), snapshot_ids.to_vec()),
        )
        .await;

        let mut inner = self.inner.lock().await;
        let Some(snapshots) = inner.repositories.get_mut(&repository) else {
            return Err(repository_missing(&repository));
        };

        let forgotten = resolve_forget_ids(snapshots, snapshot_ids)?;
        snapshots.retain(|snapshot| !forgotten.contains(&snapshot.id));

        Ok(())
    }
}
