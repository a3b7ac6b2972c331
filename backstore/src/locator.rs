//! Finds the pod through which a local-volume repository can be reached.

use k8s_openapi::api::core::v1::{Pod, Volume, VolumeMount};
use kube::ResourceExt;
use std::path::Path;
use tracing::{debug, info};

use crate::bail;
use crate::error::{ErrorKind, SnapshotError, SnapshotResult};
use crate::k8s::K8sClient;
use crate::types::Repository;

/// Volume and mount a pod must carry to see the repository's local backend.
///
/// The repository name doubles as volume and mount name. For network-local
/// volumes the mount path is scoped by the repository's network volume path.
pub fn expected_volume_and_mount(repository: &Repository) -> SnapshotResult<(Volume, VolumeMount)> {
    let Some(local) = repository.local_backend() else {
        bail!(
            ErrorKind::InvalidRepository,
            "Repository does not use a local volume backend",
            repository.qualified_name()
        );
    };

    let (volume, mut mount) = local.to_volume_and_mount(&repository.name_any());
    if repository.local_network_volume() {
        mount.mount_path = Path::new(&mount.mount_path)
            .join(repository.local_network_volume_path())
            .display()
            .to_string();
    }

    Ok((volume, mount))
}

/// Matches on the volume name only; the volume source is not compared.
pub fn has_volume(volumes: &[Volume], volume: &Volume) -> bool {
    volumes.iter().any(|candidate| candidate.name == volume.name)
}

/// Matches on mount name and mount path.
pub fn has_volume_mount(mounts: &[VolumeMount], mount: &VolumeMount) -> bool {
    mounts
        .iter()
        .any(|candidate| candidate.name == mount.name && candidate.mount_path == mount.mount_path)
}

/// Whether `pod` declares `volume` and at least one of its containers mounts it
/// as `mount`.
pub fn mounts_backend(pod: &Pod, volume: &Volume, mount: &VolumeMount) -> bool {
    let Some(spec) = &pod.spec else {
        return false;
    };

    let volumes = spec.volumes.as_deref().unwrap_or_default();
    if !has_volume(volumes, volume) {
        return false;
    }

    spec.containers.iter().any(|container| {
        has_volume_mount(container.volume_mounts.as_deref().unwrap_or_default(), mount)
    })
}

/// Returns the first pod, in list order, that mounts the repository's local
/// backend.
///
/// Every pod of the repository namespace is listed without a selector. When
/// several pods mount the backend, whichever the API server lists first wins.
pub async fn find_mounting_pod(
    k8s: &dyn K8sClient,
    repository: &Repository,
) -> SnapshotResult<Pod> {
    let (volume, mount) = expected_volume_and_mount(repository)?;
    let namespace = repository.namespace_or_default();

    let pods = k8s.list_pods(&namespace).await.map_err(|err| {
        SnapshotError::from(err).with_context(format!(
            "listing pods for repository {}",
            repository.qualified_name()
        ))
    })?;
    debug!(
        repository = %repository.qualified_name(),
        pods = pods.len(),
        volume = %volume.name,
        mount_path = %mount.mount_path,
        "looking for backend mounting pod"
    );

    match pods.into_iter().find(|pod| mounts_backend(pod, &volume, &mount)) {
        Some(pod) => {
            info!(
                repository = %repository.qualified_name(),
                pod = %pod.name_any(),
                "found backend mounting pod"
            );

            Ok(pod)
        }
        None => bail!(
            ErrorKind::MountingPodNotFound,
            "No backend mounting pod found",
            format!("repository {}", repository.qualified_name())
        ),
    }
}
