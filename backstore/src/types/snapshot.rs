use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::Repository;

/// Number of leading backend ID characters used in a snapshot name.
pub const SNAPSHOT_ID_LENGTH: usize = 8;

/// Label carrying the name of the repository a snapshot was listed from.
pub const REPOSITORY_LABEL: &str = "repository";

/// Label carrying the host the backed-up data came from.
pub const HOSTNAME_LABEL: &str = "hostname";

/// A snapshot as reported by the backend client, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSnapshot {
    pub id: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub tree: String,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Cluster-facing view of a point-in-time backup.
///
/// Built fresh per request. `metadata.uid` is the full backend ID and
/// `metadata.name` is derived from it, so a snapshot is fully determined by its
/// repository and backend snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub metadata: ObjectMeta,
    pub status: SnapshotStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStatus {
    #[serde(default)]
    pub tree: String,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Name of the repository the snapshot was listed from.
    pub repository: String,
}

/// `<repository>-<first 8 characters of the backend ID>`.
///
/// Shorter IDs are used whole.
pub fn snapshot_name(repository_name: &str, backend_id: &str) -> String {
    let suffix = backend_id.get(..SNAPSHOT_ID_LENGTH).unwrap_or(backend_id);
    format!("{repository_name}-{suffix}")
}

/// Auto-generated labels, overridden by the repository's own labels on collision.
pub fn snapshot_labels(
    repository_name: &str,
    hostname: &str,
    repository_labels: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([
        (REPOSITORY_LABEL.to_owned(), repository_name.to_owned()),
        (HOSTNAME_LABEL.to_owned(), hostname.to_owned()),
    ]);
    labels.extend(
        repository_labels
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );

    labels
}

impl Snapshot {
    /// Normalizes a backend snapshot listed from `repository`.
    pub fn from_backend(repository: &Repository, snapshot: BackendSnapshot) -> Snapshot {
        let repository_name = repository.name_any();

        let metadata = ObjectMeta {
            name: Some(snapshot_name(&repository_name, &snapshot.id)),
            namespace: repository.namespace(),
            uid: Some(snapshot.id),
            labels: Some(snapshot_labels(
                &repository_name,
                &snapshot.hostname,
                repository.labels(),
            )),
            creation_timestamp: Some(Time(snapshot.time)),
            ..ObjectMeta::default()
        };

        let status = SnapshotStatus {
            tree: snapshot.tree,
            paths: snapshot.paths,
            hostname: snapshot.hostname,
            username: snapshot.username,
            uid: snapshot.uid,
            gid: snapshot.gid,
            tags: snapshot.tags,
            repository: repository_name,
        };

        Snapshot { metadata, status }
    }

    /// Full backend ID.
    pub fn backend_id(&self) -> Option<&str> {
        self.metadata.uid.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }
}
