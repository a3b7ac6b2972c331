use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::ResourceExt;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::k8s::{ExecOutput, K8sClient, K8sError};
use crate::types::Repository;

/// A command executed through [`MockK8sClient::exec_in_pod`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub pod: String,
    pub container: String,
    pub command: Vec<String>,
    pub tty: bool,
}

#[derive(Debug, Default)]
struct Inner {
    secrets: BTreeMap<(String, String), Secret>,
    repositories: BTreeMap<(String, String), Repository>,
    pods: Vec<Pod>,
    exec_results: VecDeque<Result<ExecOutput, K8sError>>,
    exec_delay: Option<Duration>,
    exec_calls: Vec<ExecCall>,
    list_pods_calls: usize,
}

/// [`K8sClient`] keeping every resource in memory.
///
/// Exec results are scripted with [`MockK8sClient::push_exec_result`] and
/// consumed in order. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockK8sClient {
    inner: Arc<Mutex<Inner>>,
}

fn key(namespace: Option<String>, name: String) -> (String, String) {
    (namespace.unwrap_or_default(), name)
}

impl MockK8sClient {
    pub fn new() -> MockK8sClient {
        MockK8sClient::default()
    }

    pub async fn add_secret(&self, secret: Secret) {
        let mut inner = self.inner.lock().await;
        inner
            .secrets
            .insert(key(secret.namespace(), secret.name_any()), secret);
    }

    pub async fn add_repository(&self, repository: Repository) {
        let mut inner = self.inner.lock().await;
        inner
            .repositories
            .insert(key(repository.namespace(), repository.name_any()), repository);
    }

    pub async fn add_pod(&self, pod: Pod) {
        let mut inner = self.inner.lock().await;
        inner.pods.push(pod);
    }

    pub async fn push_exec_result(&self, result: Result<ExecOutput, K8sError>) {
        let mut inner = self.inner.lock().await;
        inner.exec_results.push_back(result);
    }

    /// Makes every exec sleep for `delay` before answering.
    pub async fn set_exec_delay(&self, delay: Duration) {
        let mut inner = self.inner.lock().await;
        inner.exec_delay = Some(delay);
    }

    pub async fn exec_commands(&self) -> Vec<ExecCall> {
        let inner = self.inner.lock().await;
        inner.exec_calls.clone()
    }

    pub async fn list_pods_calls(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.list_pods_calls
    }
}

#[async_trait]
impl K8sClient for MockK8sClient {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, K8sError> {
        let inner = self.inner.lock().await;
        inner
            .secrets
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
            .ok_or_else(|| K8sError::NotFound {
                kind: "Secret",
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            })
    }

    async fn get_repository(&self, namespace: &str, name: &str) -> Result<Repository, K8sError> {
        let inner = self.inner.lock().await;
        inner
            .repositories
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
            .ok_or_else(|| K8sError::NotFound {
                kind: "Repository",
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            })
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, K8sError> {
        let mut inner = self.inner.lock().await;
        inner.list_pods_calls += 1;

        Ok(inner
            .pods
            .iter()
            .filter(|pod| pod.namespace().as_deref().unwrap_or_default() == namespace)
            .cloned()
            .collect())
    }

    async fn exec_in_pod(
        &self,
        pod: &Pod,
        container: &str,
        command: Vec<String>,
        tty: bool,
    ) -> Result<ExecOutput, K8sError> {
        let delay = {
            let mut inner = self.inner.lock().await;
            inner.exec_calls.push(ExecCall {
                pod: pod.name_any(),
                container: container.to_owned(),
                command,
                tty,
            });
            inner.exec_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().await;
        inner
            .exec_results
            .pop_front()
            .unwrap_or_else(|| Err(K8sError::Exec("no scripted exec result".to_owned())))
    }
}
