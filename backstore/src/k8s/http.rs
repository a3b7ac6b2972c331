use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{AttachParams, ListParams};
use kube::{Api, Client, ResourceExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::k8s::{ExecOutput, K8sClient, K8sError};
use crate::types::Repository;

/// HTTP status the API server uses for missing resources.
const NOT_FOUND_STATUS_CODE: u16 = 404;

/// [`K8sClient`] backed by the [`kube`] crate.
#[derive(Clone)]
pub struct HttpK8sClient {
    client: Client,
}

impl std::fmt::Debug for HttpK8sClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpK8sClient").finish_non_exhaustive()
    }
}

impl HttpK8sClient {
    pub fn new(client: Client) -> HttpK8sClient {
        HttpK8sClient { client }
    }

    /// Builds a client from the ambient configuration: the in-cluster service
    /// account, or the local kubeconfig.
    pub async fn try_default() -> Result<HttpK8sClient, K8sError> {
        let client = Client::try_default().await?;

        Ok(HttpK8sClient { client })
    }
}

/// Converts a 404 from the API server into [`K8sError::NotFound`].
fn map_not_found(err: kube::Error, kind: &'static str, namespace: &str, name: &str) -> K8sError {
    match err {
        kube::Error::Api(response) if response.code == NOT_FOUND_STATUS_CODE => {
            K8sError::NotFound {
                kind,
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            }
        }
        err => K8sError::Kube(err),
    }
}

async fn read_stream<R>(reader: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buffer).await?;
    }

    Ok(buffer)
}

#[async_trait]
impl K8sClient for HttpK8sClient {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, K8sError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        secrets
            .get(name)
            .await
            .map_err(|err| map_not_found(err, "Secret", namespace, name))
    }

    async fn get_repository(&self, namespace: &str, name: &str) -> Result<Repository, K8sError> {
        let repositories: Api<Repository> = Api::namespaced(self.client.clone(), namespace);
        repositories
            .get(name)
            .await
            .map_err(|err| map_not_found(err, "Repository", namespace, name))
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, K8sError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod_list = pods.list(&ListParams::default()).await?;
        debug!(namespace, pods = pod_list.items.len(), "listed pods");

        Ok(pod_list.items)
    }

    async fn exec_in_pod(
        &self,
        pod: &Pod,
        container: &str,
        command: Vec<String>,
        tty: bool,
    ) -> Result<ExecOutput, K8sError> {
        let namespace = pod.namespace().unwrap_or_default();
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);

        // The API server rejects a separate stderr stream on a terminal session.
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(!tty)
            .tty(tty);

        let mut attached = pods.exec(&pod.name_any(), command, &params).await?;

        let stdout = attached.stdout();
        let stderr = attached.stderr();
        let status = attached.take_status();

        let (stdout, stderr) = tokio::try_join!(read_stream(stdout), read_stream(stderr))
            .map_err(|err| K8sError::Exec(err.to_string()))?;

        let status = match status {
            Some(status) => status.await,
            None => None,
        };

        attached
            .join()
            .await
            .map_err(|err| K8sError::Exec(err.to_string()))?;

        Ok(ExecOutput {
            stdout,
            stderr,
            status,
        })
    }
}
