use backstore::exec::Verb;
use backstore::k8s::{HttpK8sClient, K8sClient};
use backstore::router::SnapshotRouter;
use backstore::types::Snapshot;
use backstore_config::shared::SnapshotAccessConfig;
use std::io::Write;
use std::sync::Arc;
use tracing::info;

/// A single request of the exec protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub verb: Verb,
    pub repo_name: String,
    pub repo_namespace: String,
    pub snapshot_ids: Vec<String>,
}

/// Serves `request` against the repository's backend from inside the cluster.
///
/// This process runs in the pod that mounts the repository, so it always takes
/// the direct path. The only output on stdout is the response.
pub async fn handle_request(
    config: SnapshotAccessConfig,
    request: ExecRequest,
) -> anyhow::Result<()> {
    info!(
        verb = %request.verb,
        repository = %format!("{}/{}", request.repo_namespace, request.repo_name),
        snapshots = request.snapshot_ids.len(),
        "handling snapshot request"
    );

    let k8s: Arc<dyn K8sClient> = Arc::new(HttpK8sClient::try_default().await?);
    let repository = k8s
        .get_repository(&request.repo_namespace, &request.repo_name)
        .await?;

    let router = SnapshotRouter::from_config(k8s, &config);
    match request.verb {
        Verb::Snapshots => {
            let snapshots = router
                .list_snapshots(&repository, &request.snapshot_ids, true)
                .await?;
            write_response(std::io::stdout().lock(), &snapshots)?;
        }
        Verb::Forget => {
            router
                .forget_snapshots(&repository, &request.snapshot_ids, true)
                .await?;
        }
    }

    info!(verb = %request.verb, "snapshot request completed");

    Ok(())
}

/// Writes `snapshots` as a single JSON array line.
pub fn write_response<W: Write>(mut writer: W, snapshots: &[Snapshot]) -> anyhow::Result<()> {
    serde_json::to_writer(&mut writer, snapshots)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    Ok(())
}
