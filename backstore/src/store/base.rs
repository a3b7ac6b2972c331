use std::future::Future;

use crate::backend::BackendTarget;
use crate::bail;
use crate::error::{ErrorKind, SnapshotResult};
use crate::types::BackendSnapshot;

/// Backend client operations on a single repository.
///
/// Implementations run exactly one attempt per call and never retry.
pub trait SnapshotStore {
    /// Whether the repository has been initialized in the backend.
    ///
    /// Any failure to verify counts as "does not exist".
    fn repository_exists(&self, target: &BackendTarget) -> impl Future<Output = bool> + Send;

    /// Lists the snapshots whose ID starts with one of `snapshot_ids`, or every
    /// snapshot when `snapshot_ids` is empty.
    fn list_snapshots(
        &self,
        target: &BackendTarget,
        snapshot_ids: &[String],
    ) -> impl Future<Output = SnapshotResult<Vec<BackendSnapshot>>> + Send;

    /// Irreversibly deletes the given snapshots. IDs not present are ignored.
    ///
    /// Each ID removes at most one snapshot, see [`resolve_forget_ids`].
    fn delete_snapshots(
        &self,
        target: &BackendTarget,
        snapshot_ids: &[String],
    ) -> impl Future<Output = SnapshotResult<()>> + Send;
}

/// Whether `snapshot` is selected by `snapshot_ids`.
///
/// IDs may be abbreviated, so a selector matches every snapshot ID it prefixes.
/// An empty selection selects everything.
pub fn is_selected(snapshot: &BackendSnapshot, snapshot_ids: &[String]) -> bool {
    snapshot_ids.is_empty()
        || snapshot_ids
            .iter()
            .any(|id| !id.is_empty() && snapshot.id.starts_with(id.as_str()))
}

/// Resolves the IDs of a forget request against the snapshots present.
///
/// A requested ID names the snapshot with exactly that ID, otherwise the only
/// snapshot whose ID it prefixes. IDs naming nothing are dropped. An ID that
/// prefixes more than one snapshot fails the whole request, so nothing is
/// deleted on an ambiguous selection.
pub fn resolve_forget_ids(
    snapshots: &[BackendSnapshot],
    snapshot_ids: &[String],
) -> SnapshotResult<Vec<String>> {
    let mut resolved: Vec<String> = Vec::new();

    for requested in snapshot_ids.iter().filter(|id| !id.is_empty()) {
        let id = if let Some(exact) = snapshots.iter().find(|s| s.id == *requested) {
            &exact.id
        } else {
            let mut matches = snapshots
                .iter()
                .filter(|s| s.id.starts_with(requested.as_str()));

            let Some(first) = matches.next() else {
                continue;
            };
            if let Some(second) = matches.next() {
                bail!(
                    ErrorKind::AmbiguousSnapshotId,
                    "Snapshot ID prefix matches several snapshots",
                    format!(
                        "{requested} matches {}, {} and possibly more",
                        first.id, second.id
                    )
                );
            }

            &first.id
        };

        if !resolved.contains(id) {
            resolved.push(id.clone());
        }
    }

    Ok(resolved)
}
