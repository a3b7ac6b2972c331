use k8s_openapi::api::core::v1::{
    HostPathVolumeSource, NFSVolumeSource, PersistentVolumeClaimVolumeSource, Volume, VolumeMount,
};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bail;
use crate::error::{ErrorKind, SnapshotResult};

/// Declarative description of a backup storage backend.
///
/// The surrounding controllers own this resource; the snapshot access layer only
/// reads it.
#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "backstore.dev",
    version = "v1alpha1",
    kind = "Repository",
    plural = "repositories",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySpec {
    pub backend: Backend,
}

/// Storage location of a repository plus the secret holding its credentials.
///
/// Exactly one location field must be set.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    /// Secret, in the repository namespace, with the backend credentials.
    pub storage_secret_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Spec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs: Option<GcsSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swift: Option<SwiftSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b2: Option<B2Spec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<RestServerSpec>,
}

/// A filesystem backend, reachable only from pods that mount its volume.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalSpec {
    /// Where the volume is mounted in the workload container.
    pub mount_path: String,
    /// Directory below the mount path holding the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<HostPathSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfs: Option<NfsSource>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostPathSource {
    pub path: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSource {
    pub claim_name: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NfsSource {
    pub server: String,
    pub path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3Spec {
    /// Endpoint host, optionally with scheme. Defaults to AWS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GcsSpec {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureSpec {
    pub container: String,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwiftSpec {
    pub container: String,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct B2Spec {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestServerSpec {
    pub url: String,
}

/// The single location a [`Backend`] points at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendKind<'a> {
    Local(&'a LocalSpec),
    S3(&'a S3Spec),
    Gcs(&'a GcsSpec),
    Azure(&'a AzureSpec),
    Swift(&'a SwiftSpec),
    B2(&'a B2Spec),
    Rest(&'a RestServerSpec),
}

impl Backend {
    /// Returns the configured location.
    ///
    /// Fails with [`ErrorKind::InvalidRepository`] unless exactly one location is set.
    pub fn kind(&self) -> SnapshotResult<BackendKind<'_>> {
        let mut kinds = Vec::with_capacity(1);
        kinds.extend(self.local.as_ref().map(BackendKind::Local));
        kinds.extend(self.s3.as_ref().map(BackendKind::S3));
        kinds.extend(self.gcs.as_ref().map(BackendKind::Gcs));
        kinds.extend(self.azure.as_ref().map(BackendKind::Azure));
        kinds.extend(self.swift.as_ref().map(BackendKind::Swift));
        kinds.extend(self.b2.as_ref().map(BackendKind::B2));
        kinds.extend(self.rest.as_ref().map(BackendKind::Rest));

        match kinds.as_slice() {
            [kind] => Ok(*kind),
            [] => bail!(
                ErrorKind::InvalidRepository,
                "Repository backend has no storage location"
            ),
            _ => bail!(
                ErrorKind::InvalidRepository,
                "Repository backend has more than one storage location",
                format!("{} locations configured", kinds.len())
            ),
        }
    }
}

impl LocalSpec {
    /// Returns the volume and mount a workload uses to attach this backend.
    ///
    /// Both carry `name`. The mount sub-path is left empty: the repository
    /// sub-path is resolved below the mount path, not by the kubelet.
    pub fn to_volume_and_mount(&self, name: &str) -> (Volume, VolumeMount) {
        let volume = Volume {
            name: name.to_owned(),
            host_path: self.host_path.as_ref().map(|source| HostPathVolumeSource {
                path: source.path.clone(),
                ..HostPathVolumeSource::default()
            }),
            persistent_volume_claim: self.persistent_volume_claim.as_ref().map(|source| {
                PersistentVolumeClaimVolumeSource {
                    claim_name: source.claim_name.clone(),
                    read_only: Some(source.read_only),
                }
            }),
            nfs: self.nfs.as_ref().map(|source| NFSVolumeSource {
                server: source.server.clone(),
                path: source.path.clone(),
                read_only: Some(source.read_only),
            }),
            ..Volume::default()
        };

        let mount = VolumeMount {
            name: name.to_owned(),
            mount_path: self.mount_path.clone(),
            ..VolumeMount::default()
        };

        (volume, mount)
    }
}

impl Repository {
    /// Namespace of the repository, empty when unset.
    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_default()
    }

    /// `<namespace>/<name>`, for logs and error details.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace_or_default(), self.name_any())
    }

    pub fn local_backend(&self) -> Option<&LocalSpec> {
        self.spec.backend.local.as_ref()
    }

    /// Whether the backend is a local volume served over the network.
    ///
    /// Several repositories may share one such volume, so each one is scoped by
    /// [`Repository::local_network_volume_path`].
    pub fn local_network_volume(&self) -> bool {
        self.local_backend()
            .and_then(|local| local.nfs.as_ref())
            .is_some_and(|nfs| !nfs.server.is_empty())
    }

    /// Path segment scoping this repository inside a shared network volume.
    pub fn local_network_volume_path(&self) -> String {
        format!("{}/{}", self.namespace_or_default(), self.name_any())
    }
}
