use backstore_config::shared::ResticConfig;
use secrecy::ExposeSecret;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::backend::{
    BackendTarget, CA_CERT_DATA, GOOGLE_APPLICATION_CREDENTIALS, GOOGLE_SERVICE_ACCOUNT_JSON_KEY,
};
use crate::bail;
use crate::error::{ErrorKind, SnapshotResult};
use crate::snapshot_error;
use crate::store::{SnapshotStore, is_selected, resolve_forget_ids};
use crate::types::BackendSnapshot;

/// Variable restic reads the repository string from.
const RESTIC_REPOSITORY: &str = "RESTIC_REPOSITORY";

const CA_CERT_FILE: &str = "ca.crt";

const GCS_KEY_FILE: &str = "gcs-service-account.json";

const CACHE_DIR: &str = "restic-cache";

/// Formats a failed backend client run.
///
/// The last stderr line is where restic puts the most specific detail (for a
/// missing repository, the repository string), so it becomes the `reason` of a
/// final `exit status <code>, reason: <line>` line; earlier lines are kept above.
pub fn format_command_failure(exit_code: Option<i32>, stderr: &str) -> String {
    let status = match exit_code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_owned(),
    };

    let mut lines: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect();
    let reason = lines.pop().map(str::trim).unwrap_or_default();

    let mut message = lines.join("\n");
    if !message.is_empty() {
        message.push('\n');
    }
    message.push_str(&format!("{status}, reason: {reason}"));

    message
}

/// [`SnapshotStore`] that shells out to the restic binary.
#[derive(Debug, Clone)]
pub struct ResticStore {
    config: ResticConfig,
}

/// Flags and environment shared by every restic run against one target.
struct Invocation {
    flags: Vec<String>,
    envs: Vec<(String, String)>,
}

impl ResticStore {
    pub fn new(config: ResticConfig) -> ResticStore {
        ResticStore { config }
    }

    /// Materializes file-based credentials in the scratch directory and collects
    /// the flags and environment for `target`.
    async fn prepare(&self, target: &BackendTarget) -> SnapshotResult<Invocation> {
        let scratch_dir = target.scratch_dir();
        let mut flags = Vec::new();
        let mut envs = vec![
            (RESTIC_REPOSITORY.to_owned(), target.repository()),
            ("TMPDIR".to_owned(), scratch_dir.display().to_string()),
        ];

        if self.config.enable_cache {
            flags.push("--cache-dir".to_owned());
            flags.push(scratch_dir.join(CACHE_DIR).display().to_string());
        } else {
            flags.push("--no-cache".to_owned());
        }

        for option in target.location().options() {
            flags.push("--option".to_owned());
            flags.push(option);
        }

        for (key, value) in target.credentials().iter() {
            match key {
                CA_CERT_DATA => {
                    let path = scratch_dir.join(CA_CERT_FILE);
                    tokio::fs::write(&path, value.expose_secret()).await?;
                    flags.push("--cacert".to_owned());
                    flags.push(path.display().to_string());
                }
                GOOGLE_SERVICE_ACCOUNT_JSON_KEY => {
                    let path = scratch_dir.join(GCS_KEY_FILE);
                    tokio::fs::write(&path, value.expose_secret()).await?;
                    envs.push((
                        GOOGLE_APPLICATION_CREDENTIALS.to_owned(),
                        path.display().to_string(),
                    ));
                }
                _ => envs.push((key.to_owned(), value.expose_secret().to_owned())),
            }
        }

        Ok(Invocation { flags, envs })
    }

    /// Runs restic with `args` and returns its stdout.
    async fn run(&self, target: &BackendTarget, args: &[&str]) -> SnapshotResult<Vec<u8>> {
        let invocation = self.prepare(target).await?;

        debug!(
            binary = %self.config.binary.display(),
            ?args,
            repository = %target.repository(),
            "running restic"
        );

        let output = Command::new(&self.config.binary)
            .args(&invocation.flags)
            .args(args)
            .envs(invocation.envs)
            .current_dir(target.scratch_dir())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                snapshot_error!(
                    ErrorKind::BackendCommandFailed,
                    "Backend client could not be started",
                    format!("{}: {err}", self.config.binary.display())
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                ErrorKind::BackendCommandFailed,
                "Backend client command failed",
                format_command_failure(output.status.code(), &stderr)
            );
        }

        Ok(output.stdout)
    }

    async fn snapshots(&self, target: &BackendTarget) -> SnapshotResult<Vec<BackendSnapshot>> {
        let stdout = self
            .run(target, &["snapshots", "--json", "--quiet", "--no-lock"])
            .await?;

        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&stdout).map_err(|err| {
            snapshot_error!(
                ErrorKind::BackendOutputInvalid,
                "Backend client returned malformed snapshot list",
                err
            )
        })
    }
}

impl SnapshotStore for ResticStore {
    async fn repository_exists(&self, target: &BackendTarget) -> bool {
        match self.run(target, &["cat", "config", "--no-lock"]).await {
            Ok(_) => true,
            Err(err) => {
                debug!(repository = %target.repository(), %err, "repository existence check failed");
                false
            }
        }
    }

    /// Lists every snapshot and filters locally, so unknown IDs in the selection
    /// are skipped instead of failing the whole listing.
    async fn list_snapshots(
        &self,
        target: &BackendTarget,
        snapshot_ids: &[String],
    ) -> SnapshotResult<Vec<BackendSnapshot>> {
        let snapshots = self.snapshots(target).await?;

        Ok(snapshots
            .into_iter()
            .filter(|snapshot| is_selected(snapshot, snapshot_ids))
            .collect())
    }

    async fn delete_snapshots(
        &self,
        target: &BackendTarget,
        snapshot_ids: &[String],
    ) -> SnapshotResult<()> {
        if snapshot_ids.is_empty() {
            return Ok(());
        }

        let snapshots = self.snapshots(target).await?;
        let present = resolve_forget_ids(&snapshots, snapshot_ids)?;

        if present.is_empty() {
            debug!(repository = %target.repository(), "no matching snapshots to forget");
            return Ok(());
        }

        let mut args = vec!["forget", "--quiet", "--prune"];
        args.extend(present.iter().map(String::as_str));
        self.run(target, &args).await?;

        info!(
            repository = %target.repository(),
            snapshots = present.len(),
            "forgot snapshots"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendLocation, StorageCredentials, create_scratch_dir};
    use crate::store::is_repository_not_found;
    use k8s_openapi::ByteString;
    use k8s_openapi::api::core::v1::Secret;
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    #[cfg(unix)]
    const LISTED_SNAPSHOTS: &str = r#"[
        {"id": "aaaa1111ffff", "time": "2024-05-01T10:00:00Z"},
        {"id": "aaaa2222ffff", "time": "2024-05-01T11:00:00Z"},
        {"id": "bbbb3333ffff", "time": "2024-05-01T12:00:00Z"}
    ]"#;

    /// Writes a restic stand-in that appends its arguments to `record` and
    /// answers `snapshots` with [`LISTED_SNAPSHOTS`].
    #[cfg(unix)]
    fn fake_restic(dir: &Path, record: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = format!(
            "#!/bin/sh\necho \"$*\" >> '{}'\ncase \" $* \" in\n  *\" snapshots \"*) printf '%s' '{}' ;;\nesac\n",
            record.display(),
            LISTED_SNAPSHOTS
        );
        let binary = dir.join("restic");
        std::fs::write(&binary, script).unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        binary
    }

    #[cfg(unix)]
    fn recorded_runs(record: &Path) -> Vec<String> {
        std::fs::read_to_string(record)
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    fn target(entries: &[(&str, &str)]) -> BackendTarget {
        let secret = Secret {
            data: Some(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Secret::default()
        };

        BackendTarget::new(
            BackendLocation::S3 {
                endpoint: "minio:9000".to_owned(),
                bucket: "bucket".to_owned(),
                prefix: "r1".to_owned(),
                region: Some("us-east-1".to_owned()),
            },
            StorageCredentials::from_secret(&secret).unwrap(),
            create_scratch_dir(None).unwrap(),
        )
    }

    #[test]
    fn failure_puts_last_stderr_line_in_reason() {
        let stderr = "Fatal: unable to open config file: Stat: stat /safe/data/config: no such file or directory\n\
                      Is there a repository at the following location?\n\
                      /safe/data\n";
        let message = format_command_failure(Some(1), stderr);

        assert_eq!(
            message.lines().last(),
            Some("exit status 1, reason: /safe/data")
        );
        assert!(message.starts_with("Fatal: unable to open config file"));
        assert!(is_repository_not_found("/safe/data", &message));
    }

    #[test]
    fn failure_without_stderr_has_empty_reason() {
        assert_eq!(format_command_failure(Some(2), ""), "exit status 2, reason: ");
        assert_eq!(
            format_command_failure(None, "killed\n"),
            "terminated by signal, reason: killed"
        );
    }

    #[test]
    fn wrong_password_is_not_repository_not_found() {
        let message = format_command_failure(
            Some(1),
            "Fatal: wrong password or no key found\n",
        );

        assert!(!is_repository_not_found("/safe/data", &message));
    }

    #[tokio::test]
    async fn prepare_materializes_file_credentials() {
        let target = target(&[
            ("RESTIC_PASSWORD", "pw"),
            ("AWS_ACCESS_KEY_ID", "key"),
            ("CA_CERT_DATA", "-----BEGIN CERTIFICATE-----"),
        ]);
        let store = ResticStore::new(ResticConfig::default());

        let invocation = store.prepare(&target).await.unwrap();

        let ca_path = target.scratch_dir().join(CA_CERT_FILE);
        assert_eq!(
            std::fs::read_to_string(&ca_path).unwrap(),
            "-----BEGIN CERTIFICATE-----"
        );
        assert!(invocation.flags.contains(&"--no-cache".to_owned()));
        assert!(invocation.flags.contains(&"s3.region=us-east-1".to_owned()));
        assert!(invocation.flags.contains(&ca_path.display().to_string()));
        assert!(invocation.envs.contains(&(
            RESTIC_REPOSITORY.to_owned(),
            "s3:minio:9000/bucket/r1".to_owned()
        )));
        assert!(invocation
            .envs
            .contains(&("AWS_ACCESS_KEY_ID".to_owned(), "key".to_owned())));
        assert!(!invocation.envs.iter().any(|(key, _)| key == CA_CERT_DATA));
    }

    #[tokio::test]
    async fn cache_lives_in_scratch_dir_when_enabled() {
        let target = target(&[("RESTIC_PASSWORD", "pw")]);
        let store = ResticStore::new(ResticConfig {
            enable_cache: true,
            ..ResticConfig::default()
        });

        let invocation = store.prepare(&target).await.unwrap();

        assert!(!invocation.flags.contains(&"--no-cache".to_owned()));
        assert!(invocation
            .flags
            .contains(&target.scratch_dir().join(CACHE_DIR).display().to_string()));
    }

    #[tokio::test]
    async fn missing_binary_is_a_backend_failure() {
        let target = target(&[("RESTIC_PASSWORD", "pw")]);
        let store = ResticStore::new(ResticConfig {
            binary: PathBuf::from("/nonexistent/restic"),
            ..ResticConfig::default()
        });

        let err = store.list_snapshots(&target, &[]).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BackendCommandFailed);
        assert!(!store.repository_exists(&target).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn forget_with_ambiguous_prefix_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("runs.log");
        let store = ResticStore::new(ResticConfig {
            binary: fake_restic(dir.path(), &record),
            ..ResticConfig::default()
        });
        let target = target(&[("RESTIC_PASSWORD", "pw")]);

        let err = store
            .delete_snapshots(&target, &["aaaa".to_owned()])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AmbiguousSnapshotId);
        let runs = recorded_runs(&record);
        assert_eq!(runs.len(), 1);
        assert!(!runs.iter().any(|run| run.contains(" forget ")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn forget_passes_one_full_id_per_requested_id() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("runs.log");
        let store = ResticStore::new(ResticConfig {
            binary: fake_restic(dir.path(), &record),
            ..ResticConfig::default()
        });
        let target = target(&[("RESTIC_PASSWORD", "pw")]);

        store
            .delete_snapshots(
                &target,
                &["aaaa2".to_owned(), "bbbb3333ffff".to_owned(), "cccc".to_owned()],
            )
            .await
            .unwrap();

        let runs = recorded_runs(&record);
        let forget = runs.last().unwrap();
        assert!(forget.starts_with("--no-cache "));
        assert!(forget.ends_with(" forget --quiet --prune aaaa2222ffff bbbb3333ffff"));
    }
}
