use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use thiserror::Error;

use crate::types::Repository;

/// Status value the API server reports for a command that exited successfully.
const EXEC_STATUS_SUCCESS: &str = "Success";

/// Errors emitted by the Kubernetes integration.
#[derive(Debug, Error)]
pub enum K8sError {
    /// The API server rejected a request or could not be reached.
    #[error("An error occurred with kube when dealing with K8s: {0}")]
    Kube(#[from] kube::Error),
    /// A named resource does not exist.
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    /// The exec stream could not be established or broke mid-way.
    #[error("exec stream failed: {0}")]
    Exec(String),
}

/// Output captured from a command executed inside a pod.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    /// Empty when a terminal was requested, since the terminal merges it into stdout.
    pub stderr: Vec<u8>,
    /// Final status reported by the API server, if the stream delivered one.
    pub status: Option<Status>,
}

impl ExecOutput {
    /// Whether the command completed with a success status.
    pub fn succeeded(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|status| status.status.as_deref())
            == Some(EXEC_STATUS_SUCCESS)
    }

    /// Human readable failure reason from the reported status.
    pub fn failure_message(&self) -> String {
        match &self.status {
            Some(status) => status
                .message
                .clone()
                .or_else(|| status.reason.clone())
                .unwrap_or_else(|| "command failed without a message".to_owned()),
            None => "no exit status received from the exec stream".to_owned(),
        }
    }
}

/// Cluster operations the snapshot access layer depends on.
///
/// Consumers take `Arc<dyn K8sClient>` so tests can substitute an in-memory
/// implementation for [`crate::k8s::HttpK8sClient`].
#[async_trait]
pub trait K8sClient: Send + Sync {
    /// Fetches a secret.
    ///
    /// Returns [`K8sError::NotFound`] when it does not exist.
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, K8sError>;

    /// Fetches a [`Repository`] resource.
    ///
    /// Returns [`K8sError::NotFound`] when it does not exist.
    async fn get_repository(&self, namespace: &str, name: &str) -> Result<Repository, K8sError>;

    /// Lists every pod in `namespace`, in the order the API server returns them.
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, K8sError>;

    /// Runs `command` in `container` of `pod` and waits for it to finish.
    ///
    /// A failing command is not an error here: inspect [`ExecOutput::succeeded`].
    /// Errors are reserved for transport failures.
    async fn exec_in_pod(
        &self,
        pod: &Pod,
        container: &str,
        command: Vec<String>,
        tty: bool,
    ) -> Result<ExecOutput, K8sError>;
}
