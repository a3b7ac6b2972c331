//! Runs the snapshot sub-protocol inside the pod that mounts a repository's
//! local volume, for callers that cannot reach the volume themselves.

use backstore_config::shared::ExecConfig;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

use crate::bail;
use crate::error::{ErrorKind, SnapshotResult};
use crate::k8s::K8sClient;
use crate::locator::find_mounting_pod;
use crate::snapshot_error;
use crate::types::Repository;

/// Operation requested from the in-pod executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Prints the repository's snapshots as a JSON array on stdout.
    Snapshots,
    /// Forgets the given snapshots and prints nothing meaningful.
    Forget,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Snapshots => "snapshots",
            Verb::Forget => "forget",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<executable> <verb> --repo-name=<name> --repo-namespace=<namespace> [ids...]`
pub fn build_exec_command(
    executable: &str,
    verb: Verb,
    repository: &Repository,
    snapshot_ids: &[String],
) -> Vec<String> {
    let mut command = vec![
        executable.to_owned(),
        verb.as_str().to_owned(),
        format!("--repo-name={}", repository.name_any()),
        format!("--repo-namespace={}", repository.namespace_or_default()),
    ];
    command.extend(snapshot_ids.iter().cloned());

    command
}

/// Runs a protocol verb somewhere that can reach the repository's data and
/// returns the captured stdout.
pub trait RemoteInvoker {
    fn invoke(
        &self,
        repository: &Repository,
        verb: Verb,
        snapshot_ids: &[String],
    ) -> impl Future<Output = SnapshotResult<Vec<u8>>> + Send;
}

/// [`RemoteInvoker`] that executes the protocol in the repository's mounting pod.
#[derive(Clone)]
pub struct MountingPodInvoker {
    k8s: Arc<dyn K8sClient>,
    config: ExecConfig,
}

impl fmt::Debug for MountingPodInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountingPodInvoker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MountingPodInvoker {
    pub fn new(k8s: Arc<dyn K8sClient>, config: ExecConfig) -> MountingPodInvoker {
        MountingPodInvoker { k8s, config }
    }

    /// Executes `command` in `pod` and returns its stdout.
    ///
    /// The whole round trip is bounded by the configured timeout. A failed
    /// command is reported with whatever the remote side wrote: stderr when it
    /// was captured separately, stdout otherwise.
    pub async fn exec_and_capture(
        &self,
        pod: &Pod,
        command: Vec<String>,
    ) -> SnapshotResult<Vec<u8>> {
        let pod_name = format!("{}/{}", pod.namespace().unwrap_or_default(), pod.name_any());
        info!(pod = %pod_name, ?command, "executing command in pod");

        let exec = self
            .k8s
            .exec_in_pod(pod, &self.config.container, command, self.config.tty);
        let output = match tokio::time::timeout(self.config.timeout(), exec).await {
            Ok(result) => result,
            Err(_) => {
                error!(pod = %pod_name, timeout_secs = self.config.timeout_secs, "exec timed out");
                bail!(
                    ErrorKind::ExecTimedOut,
                    "Command in mounting pod did not finish in time",
                    format!("pod {pod_name} after {}s", self.config.timeout_secs)
                );
            }
        };

        let output = output.map_err(|err| {
            snapshot_error!(
                ErrorKind::ExecFailed,
                "Could not execute command in mounting pod",
                format!("pod {pod_name}: {err}")
            )
        })?;

        if !output.succeeded() {
            let remote_output = if output.stderr.is_empty() {
                &output.stdout
            } else {
                &output.stderr
            };
            let reason = String::from_utf8_lossy(remote_output);

            bail!(
                ErrorKind::ExecFailed,
                "Command in mounting pod failed",
                format!(
                    "could not execute: {}, reason: {}",
                    output.failure_message(),
                    reason.trim_end()
                )
            );
        }

        Ok(output.stdout)
    }
}

impl RemoteInvoker for MountingPodInvoker {
    async fn invoke(
        &self,
        repository: &Repository,
        verb: Verb,
        snapshot_ids: &[String],
    ) -> SnapshotResult<Vec<u8>> {
        let pod = find_mounting_pod(self.k8s.as_ref(), repository).await?;
        let command = build_exec_command(&self.config.executable, verb, repository, snapshot_ids);

        self.exec_and_capture(&pod, command)
            .await
            .map_err(|err| err.with_context(format!("{verb} on {}", repository.qualified_name())))
    }
}
