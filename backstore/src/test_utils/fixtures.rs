use chrono::{DateTime, Utc};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{
    Container, HostPathVolumeSource, Pod, PodSpec, Secret, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Status};
use std::collections::BTreeMap;

use crate::backend::RESTIC_PASSWORD;
use crate::k8s::ExecOutput;
use crate::types::{
    Backend, BackendSnapshot, HostPathSource, LocalSpec, NfsSource, Repository, RepositorySpec,
    S3Spec,
};

/// Mount path used by every local repository fixture.
pub const LOCAL_MOUNT_PATH: &str = "/safe/data";

/// Endpoint used by every S3 repository fixture.
pub const S3_ENDPOINT: &str = "minio:9000";

pub fn storage_secret_name(repository_name: &str) -> String {
    format!("{repository_name}-storage")
}

fn repository(namespace: &str, name: &str, backend: Backend) -> Repository {
    let mut repository = Repository::new(name, RepositorySpec { backend });
    repository.metadata.namespace = Some(namespace.to_owned());
    repository
}

/// A repository on a host-path volume mounted at [`LOCAL_MOUNT_PATH`].
pub fn local_repository(namespace: &str, name: &str) -> Repository {
    repository(
        namespace,
        name,
        Backend {
            storage_secret_name: storage_secret_name(name),
            local: Some(LocalSpec {
                mount_path: LOCAL_MOUNT_PATH.to_owned(),
                host_path: Some(HostPathSource {
                    path: "/var/backups".to_owned(),
                }),
                ..LocalSpec::default()
            }),
            ..Backend::default()
        },
    )
}

/// A repository on an NFS volume mounted at [`LOCAL_MOUNT_PATH`].
pub fn network_local_repository(namespace: &str, name: &str) -> Repository {
    repository(
        namespace,
        name,
        Backend {
            storage_secret_name: storage_secret_name(name),
            local: Some(LocalSpec {
                mount_path: LOCAL_MOUNT_PATH.to_owned(),
                nfs: Some(NfsSource {
                    server: "nfs.backstore.svc".to_owned(),
                    path: "/exports".to_owned(),
                    read_only: false,
                }),
                ..LocalSpec::default()
            }),
            ..Backend::default()
        },
    )
}

/// A repository under `bucket/<name>` of [`S3_ENDPOINT`].
pub fn s3_repository(namespace: &str, name: &str) -> Repository {
    repository(
        namespace,
        name,
        Backend {
            storage_secret_name: storage_secret_name(name),
            s3: Some(S3Spec {
                endpoint: Some(S3_ENDPOINT.to_owned()),
                bucket: "bucket".to_owned(),
                prefix: name.to_owned(),
                ..S3Spec::default()
            }),
            ..Backend::default()
        },
    )
}

/// The storage secret every repository fixture points at.
pub fn storage_secret(namespace: &str, repository_name: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(storage_secret_name(repository_name)),
            namespace: Some(namespace.to_owned()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([
            (RESTIC_PASSWORD.to_owned(), ByteString(b"changeit".to_vec())),
            (
                "AWS_ACCESS_KEY_ID".to_owned(),
                ByteString(b"minio".to_vec()),
            ),
        ])),
        ..Secret::default()
    }
}

/// A pod with one host-path volume and a single container mounting it.
pub fn pod_with_mount(
    name: &str,
    namespace: &str,
    volume_name: &str,
    mount_name: &str,
    mount_path: &str,
) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(namespace.to_owned()),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            volumes: Some(vec![Volume {
                name: volume_name.to_owned(),
                host_path: Some(HostPathVolumeSource {
                    path: "/var/backups".to_owned(),
                    ..HostPathVolumeSource::default()
                }),
                ..Volume::default()
            }]),
            containers: vec![
                Container {
                    name: "app".to_owned(),
                    ..Container::default()
                },
                Container {
                    name: "backstore".to_owned(),
                    volume_mounts: Some(vec![VolumeMount {
                        name: mount_name.to_owned(),
                        mount_path: mount_path.to_owned(),
                        ..VolumeMount::default()
                    }]),
                    ..Container::default()
                },
            ],
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}

pub fn backend_snapshot(id: &str, hostname: &str) -> BackendSnapshot {
    BackendSnapshot {
        id: id.to_owned(),
        time: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .map(|time| time.with_timezone(&Utc))
            .unwrap_or_default(),
        tree: format!("tree-{id}"),
        paths: vec!["/data".to_owned()],
        hostname: hostname.to_owned(),
        username: "root".to_owned(),
        uid: 0,
        gid: 0,
        tags: Vec::new(),
    }
}

/// Output of a command that exited with status 0.
pub fn exec_success(stdout: &[u8]) -> ExecOutput {
    ExecOutput {
        stdout: stdout.to_vec(),
        stderr: Vec::new(),
        status: Some(Status {
            status: Some("Success".to_owned()),
            ..Status::default()
        }),
    }
}

/// Output of a failed command run on a terminal, where everything lands in stdout.
pub fn exec_failure(message: &str, stdout: &[u8]) -> ExecOutput {
    ExecOutput {
        stdout: stdout.to_vec(),
        stderr: Vec::new(),
        status: Some(Status {
            status: Some("Failure".to_owned()),
            message: Some(message.to_owned()),
            reason: Some("NonZeroExitCode".to_owned()),
            ..Status::default()
        }),
    }
}
