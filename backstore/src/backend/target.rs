use kube::ResourceExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use crate::backend::StorageCredentials;
use crate::bail;
use crate::error::{ErrorKind, SnapshotResult};
use crate::k8s::K8sClient;
use crate::types::{BackendKind, Repository};

/// Endpoint used for S3 backends that do not name one.
const DEFAULT_S3_ENDPOINT: &str = "s3.amazonaws.com";

/// Prefix of per-call scratch directories.
const SCRATCH_DIR_PREFIX: &str = "backstore-";

/// Where a repository's data lives, resolved from its [`crate::types::Backend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendLocation {
    Local {
        path: PathBuf,
    },
    S3 {
        endpoint: String,
        bucket: String,
        prefix: String,
        region: Option<String>,
    },
    Gcs {
        bucket: String,
        prefix: String,
    },
    Azure {
        container: String,
        prefix: String,
    },
    Swift {
        container: String,
        prefix: String,
    },
    B2 {
        bucket: String,
        prefix: String,
    },
    Rest {
        url: String,
    },
}

fn require(value: &str, field: &'static str) -> SnapshotResult<()> {
    if value.trim().is_empty() {
        bail!(
            ErrorKind::InvalidRepository,
            "Repository backend field is empty",
            format!("`{field}` must be set")
        );
    }

    Ok(())
}

fn join_relative(base: PathBuf, segment: &str) -> PathBuf {
    let segment = segment.trim_start_matches('/');
    if segment.is_empty() {
        base
    } else {
        base.join(segment)
    }
}

impl BackendLocation {
    /// Resolves the location of `repository`.
    ///
    /// Network-local volumes are scoped by the repository's network volume path,
    /// which is appended to the mount path before the repository sub-path.
    pub fn resolve(repository: &Repository) -> SnapshotResult<BackendLocation> {
        let location = match repository.spec.backend.kind()? {
            BackendKind::Local(local) => {
                require(&local.mount_path, "local.mountPath")?;

                let mut path = PathBuf::from(&local.mount_path);
                if repository.local_network_volume() {
                    path = join_relative(path, &repository.local_network_volume_path());
                }
                if let Some(sub_path) = &local.sub_path {
                    path = join_relative(path, sub_path);
                }

                BackendLocation::Local { path }
            }
            BackendKind::S3(s3) => {
                require(&s3.bucket, "s3.bucket")?;

                BackendLocation::S3 {
                    endpoint: s3
                        .endpoint
                        .as_deref()
                        .filter(|endpoint| !endpoint.is_empty())
                        .unwrap_or(DEFAULT_S3_ENDPOINT)
                        .trim_end_matches('/')
                        .to_owned(),
                    bucket: s3.bucket.clone(),
                    prefix: s3.prefix.clone(),
                    region: s3.region.clone(),
                }
            }
            BackendKind::Gcs(gcs) => {
                require(&gcs.bucket, "gcs.bucket")?;

                BackendLocation::Gcs {
                    bucket: gcs.bucket.clone(),
                    prefix: gcs.prefix.clone(),
                }
            }
            BackendKind::Azure(azure) => {
                require(&azure.container, "azure.container")?;

                BackendLocation::Azure {
                    container: azure.container.clone(),
                    prefix: azure.prefix.clone(),
                }
            }
            BackendKind::Swift(swift) => {
                require(&swift.container, "swift.container")?;

                BackendLocation::Swift {
                    container: swift.container.clone(),
                    prefix: swift.prefix.clone(),
                }
            }
            BackendKind::B2(b2) => {
                require(&b2.bucket, "b2.bucket")?;

                BackendLocation::B2 {
                    bucket: b2.bucket.clone(),
                    prefix: b2.prefix.clone(),
                }
            }
            BackendKind::Rest(rest) => {
                require(&rest.url, "rest.url")?;

                BackendLocation::Rest {
                    url: rest.url.clone(),
                }
            }
        };

        Ok(location)
    }

    /// The repository string understood by the backend client.
    ///
    /// This exact string is what the backend echoes back when the repository
    /// does not exist, see [`crate::store::is_repository_not_found`].
    pub fn repository(&self) -> String {
        fn prefixed(scheme: &str, bucket: &str, prefix: &str) -> String {
            format!("{scheme}:{bucket}:/{}", prefix.trim_matches('/'))
        }

        match self {
            BackendLocation::Local { path } => path.display().to_string(),
            BackendLocation::S3 {
                endpoint,
                bucket,
                prefix,
                ..
            } => {
                let prefix = prefix.trim_matches('/');
                if prefix.is_empty() {
                    format!("s3:{endpoint}/{bucket}")
                } else {
                    format!("s3:{endpoint}/{bucket}/{prefix}")
                }
            }
            BackendLocation::Gcs { bucket, prefix } => prefixed("gs", bucket, prefix),
            BackendLocation::Azure { container, prefix } => prefixed("azure", container, prefix),
            BackendLocation::Swift { container, prefix } => prefixed("swift", container, prefix),
            BackendLocation::B2 { bucket, prefix } => prefixed("b2", bucket, prefix),
            BackendLocation::Rest { url } => format!("rest:{url}"),
        }
    }

    /// Extended backend options, as `key=value` pairs.
    pub fn options(&self) -> Vec<String> {
        match self {
            BackendLocation::S3 {
                region: Some(region),
                ..
            } if !region.is_empty() => vec![format!("s3.region={region}")],
            _ => Vec::new(),
        }
    }
}

/// Everything needed to run one backend client call.
///
/// Owns the call's scratch directory: dropping the target removes it, on every
/// exit path of the call that created it.
#[derive(Debug)]
pub struct BackendTarget {
    location: BackendLocation,
    credentials: StorageCredentials,
    scratch_dir: TempDir,
}

impl BackendTarget {
    pub fn new(
        location: BackendLocation,
        credentials: StorageCredentials,
        scratch_dir: TempDir,
    ) -> BackendTarget {
        BackendTarget {
            location,
            credentials,
            scratch_dir,
        }
    }

    pub fn location(&self) -> &BackendLocation {
        &self.location
    }

    /// See [`BackendLocation::repository`].
    pub fn repository(&self) -> String {
        self.location.repository()
    }

    pub fn credentials(&self) -> &StorageCredentials {
        &self.credentials
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch_dir.path()
    }
}

/// Creates a private scratch directory below `root`, or the system temp directory.
pub fn create_scratch_dir(root: Option<&Path>) -> SnapshotResult<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(SCRATCH_DIR_PREFIX);

    let scratch_dir = match root {
        Some(root) => builder.tempdir_in(root)?,
        None => builder.tempdir()?,
    };

    Ok(scratch_dir)
}

/// Builds the backend target of `repository` for a single call.
///
/// Reads the storage secret fresh on every call; nothing is cached.
pub async fn resolve_backend_target(
    k8s: &dyn K8sClient,
    repository: &Repository,
    scratch_root: Option<&Path>,
) -> SnapshotResult<BackendTarget> {
    let namespace = repository.namespace_or_default();
    let secret_name = &repository.spec.backend.storage_secret_name;
    if secret_name.is_empty() {
        bail!(
            ErrorKind::ConfigError,
            "Repository does not reference a storage secret",
            repository.qualified_name()
        );
    }

    let location = BackendLocation::resolve(repository)
        .map_err(|err| err.with_context(repository.qualified_name()))?;

    let secret = k8s
        .get_secret(&namespace, secret_name)
        .await
        .map_err(|err| {
            crate::error::SnapshotError::from(err)
                .with_context(format!("storage secret of {}", repository.qualified_name()))
        })?;
    let credentials = StorageCredentials::from_secret(&secret)
        .map_err(|err| err.with_context(format!("secret {namespace}/{secret_name}")))?;

    let scratch_dir = create_scratch_dir(scratch_root)?;
    debug!(
        repository = %repository.name_any(),
        namespace,
        scratch_dir = %scratch_dir.path().display(),
        "resolved backend target"
    );

    Ok(BackendTarget::new(location, credentials, scratch_dir))
}
