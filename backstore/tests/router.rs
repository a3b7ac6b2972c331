mod common;

use backstore::error::ErrorKind;
use backstore::store::format_command_failure;
use backstore::test_utils::fixtures::{
    backend_snapshot, exec_failure, exec_success, local_repository, pod_with_mount,
    s3_repository,
};
use backstore::test_utils::store::StoreCall;
use backstore::types::{HOSTNAME_LABEL, REPOSITORY_LABEL, Snapshot};
use backstore_telemetry::init_test_tracing;
use std::collections::BTreeMap;

use crate::common::{LOCAL_TARGET, S3_TARGET, spawn_router};

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[tokio::test]
async fn listing_normalizes_backend_snapshots() {
    init_test_tracing();
    let test = spawn_router();
    let repository = s3_repository("ns", "r1");
    test.register(&repository).await;
    test.store
        .add_snapshot(S3_TARGET, backend_snapshot("abcdef1234567890", "h1"))
        .await;

    let snapshots = test
        .router
        .list_snapshots(&repository, &[], false)
        .await
        .unwrap();

    assert_eq!(snapshots.len(), 1);
    let snapshot = &snapshots[0];
    assert_eq!(snapshot.name(), Some("r1-abcdef12"));
    assert_eq!(snapshot.backend_id(), Some("abcdef1234567890"));
    assert_eq!(snapshot.metadata.namespace.as_deref(), Some("ns"));
    assert_eq!(
        snapshot.metadata.labels,
        Some(BTreeMap::from([
            (REPOSITORY_LABEL.to_owned(), "r1".to_owned()),
            (HOSTNAME_LABEL.to_owned(), "h1".to_owned()),
        ]))
    );
    assert_eq!(snapshot.status.paths, vec!["/data".to_owned()]);
    assert_eq!(snapshot.status.repository, "r1");
}

#[tokio::test]
async fn repository_labels_override_generated_labels() {
    init_test_tracing();
    let test = spawn_router();
    let mut repository = s3_repository("ns", "r1");
    repository.metadata.labels = Some(BTreeMap::from([
        (HOSTNAME_LABEL.to_owned(), "override".to_owned()),
        ("team".to_owned(), "storage".to_owned()),
    ]));
    test.register(&repository).await;
    test.store
        .add_snapshot(S3_TARGET, backend_snapshot("abcdef1234567890", "h1"))
        .await;

    let snapshots = test
        .router
        .list_snapshots(&repository, &[], false)
        .await
        .unwrap();

    let labels = snapshots[0].metadata.labels.clone().unwrap();
    assert_eq!(labels[HOSTNAME_LABEL], "override");
    assert_eq!(labels[REPOSITORY_LABEL], "r1");
    assert_eq!(labels["team"], "storage");
}

#[tokio::test]
async fn selection_matches_id_prefixes() {
    init_test_tracing();
    let test = spawn_router();
    let repository = s3_repository("ns", "r1");
    test.register(&repository).await;
    for id in ["aaaa1111", "aaaa2222", "bbbb3333"] {
        test.store
            .add_snapshot(S3_TARGET, backend_snapshot(id, "h1"))
            .await;
    }

    let snapshots = test
        .router
        .list_snapshots(&repository, &ids(&["aaaa2", "bbbb", "cccc"]), false)
        .await
        .unwrap();

    let listed: Vec<_> = snapshots.iter().filter_map(Snapshot::backend_id).collect();
    assert_eq!(listed, vec!["aaaa2222", "bbbb3333"]);
}

#[tokio::test]
async fn uninitialized_repository_has_no_snapshots() {
    init_test_tracing();
    let test = spawn_router();
    let repository = s3_repository("ns", "r1");
    test.register(&repository).await;

    let snapshots = test
        .router
        .list_snapshots(&repository, &[], false)
        .await
        .unwrap();

    assert!(snapshots.is_empty());
    // The listing itself is never attempted.
    assert_eq!(
        test.store.calls().await,
        vec![StoreCall::Exists(S3_TARGET.to_owned())]
    );
}

#[tokio::test]
async fn repository_removed_while_listing_has_no_snapshots() {
    init_test_tracing();
    let test = spawn_router();
    let repository = s3_repository("ns", "r1");
    test.register(&repository).await;
    test.store.create_repository(S3_TARGET).await;
    test.store
        .fail_list_with(format_command_failure(
            Some(1),
            &format!("Fatal: unable to open config file\n{S3_TARGET}\n"),
        ))
        .await;

    let snapshots = test
        .router
        .list_snapshots(&repository, &[], false)
        .await
        .unwrap();

    assert!(snapshots.is_empty());
}

#[tokio::test]
async fn near_miss_of_not_found_sentinel_is_a_failure() {
    init_test_tracing();
    let test = spawn_router();
    let repository = s3_repository("ns", "r1");
    test.register(&repository).await;
    test.store.create_repository(S3_TARGET).await;
    test.store
        .fail_list_with(format!("exit status 1, reason: {S3_TARGET}/extra"))
        .await;

    let err = test
        .router
        .list_snapshots(&repository, &[], false)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BackendCommandFailed);
    let detail = err.detail().unwrap();
    assert!(detail.starts_with("listing snapshots of ns/r1"));
    assert!(detail.contains("reason: s3:minio:9000/bucket/r1/extra"));
}

#[tokio::test]
async fn forget_removes_only_present_snapshots_and_is_idempotent() {
    init_test_tracing();
    let test = spawn_router();
    let repository = s3_repository("ns", "r1");
    test.register(&repository).await;
    for id in ["aaaa1111", "bbbb2222"] {
        test.store
            .add_snapshot(S3_TARGET, backend_snapshot(id, "h1"))
            .await;
    }

    let forgotten = ids(&["aaaa1111", "never-there"]);
    test.router
        .forget_snapshots(&repository, &forgotten, false)
        .await
        .unwrap();
    test.router
        .forget_snapshots(&repository, &forgotten, false)
        .await
        .unwrap();

    let remaining = test
        .router
        .list_snapshots(&repository, &forgotten, false)
        .await
        .unwrap();
    assert!(remaining.is_empty());
    assert_eq!(test.store.snapshot_ids(S3_TARGET).await, vec!["bbbb2222"]);
}

#[tokio::test]
async fn forget_with_ambiguous_prefix_keeps_every_snapshot() {
    init_test_tracing();
    let test = spawn_router();
    let repository = s3_repository("ns", "r1");
    test.register(&repository).await;
    for id in ["aaaa1111ffff", "aaaa2222ffff", "bbbb3333ffff"] {
        test.store
            .add_snapshot(S3_TARGET, backend_snapshot(id, "h1"))
            .await;
    }

    let err = test
        .router
        .forget_snapshots(&repository, &ids(&["aaaa"]), false)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AmbiguousSnapshotId);
    assert!(err.detail().unwrap().starts_with("forgetting snapshots of ns/r1"));
    assert_eq!(
        test.store.snapshot_ids(S3_TARGET).await,
        vec!["aaaa1111ffff", "aaaa2222ffff", "bbbb3333ffff"]
    );

    test.router
        .forget_snapshots(&repository, &ids(&["aaaa2"]), false)
        .await
        .unwrap();

    assert_eq!(
        test.store.snapshot_ids(S3_TARGET).await,
        vec!["aaaa1111ffff", "bbbb3333ffff"]
    );
}

#[tokio::test]
async fn forget_on_uninitialized_repository_is_a_no_op() {
    init_test_tracing();
    let test = spawn_router();
    let repository = s3_repository("ns", "r1");
    test.register(&repository).await;

    test.router
        .forget_snapshots(&repository, &ids(&["aaaa1111"]), false)
        .await
        .unwrap();

    assert!(
        !test
            .store
            .calls()
            .await
            .iter()
            .any(|call| matches!(call, StoreCall::Delete(..)))
    );
}

#[tokio::test]
async fn forget_without_ids_touches_nothing() {
    init_test_tracing();
    let test = spawn_router();
    let repository = local_repository("ns", "r1");
    test.register(&repository).await;

    test.router
        .forget_snapshots(&repository, &[], false)
        .await
        .unwrap();

    assert!(test.store.calls().await.is_empty());
    assert_eq!(test.k8s.list_pods_calls().await, 0);
}

#[tokio::test]
async fn direct_path_never_locates_a_pod() {
    init_test_tracing();
    let test = spawn_router();
    let local = local_repository("ns", "r1");
    let remote = s3_repository("ns", "r2");
    test.register(&local).await;
    test.register(&remote).await;
    test.k8s
        .add_pod(pod_with_mount("p1", "ns", "r1", "r1", LOCAL_TARGET))
        .await;
    test.store
        .add_snapshot(LOCAL_TARGET, backend_snapshot("abcdef1234567890", "h1"))
        .await;

    let in_cluster = test.router.list_snapshots(&local, &[], true).await.unwrap();
    test.router.list_snapshots(&remote, &[], false).await.unwrap();
    test.router
        .forget_snapshots(&remote, &ids(&["abc"]), false)
        .await
        .unwrap();

    assert_eq!(in_cluster.len(), 1);
    assert_eq!(test.k8s.list_pods_calls().await, 0);
    assert!(test.k8s.exec_commands().await.is_empty());
}

#[tokio::test]
async fn local_repository_outside_cluster_is_listed_through_mounting_pod() {
    init_test_tracing();
    let test = spawn_router();
    let repository = local_repository("ns", "r1");
    test.register(&repository).await;
    test.k8s
        .add_pod(pod_with_mount("p1", "ns", "r1", "r1", LOCAL_TARGET))
        .await;
    let expected = vec![Snapshot::from_backend(
        &repository,
        backend_snapshot("abcdef1234567890", "h1"),
    )];
    test.k8s
        .push_exec_result(Ok(exec_success(&serde_json::to_vec(&expected).unwrap())))
        .await;

    let snapshots = test
        .router
        .list_snapshots(&repository, &ids(&["abcdef12"]), false)
        .await
        .unwrap();

    assert_eq!(snapshots, expected);
    assert!(test.store.calls().await.is_empty());
    let commands = test.k8s.exec_commands().await;
    assert_eq!(commands.len(), 1);
    assert_eq!(
        commands[0].command,
        vec![
            "/backstore-exec",
            "snapshots",
            "--repo-name=r1",
            "--repo-namespace=ns",
            "abcdef12",
        ]
    );
    assert!(commands[0].tty);
}

#[tokio::test]
async fn malformed_pod_output_is_a_hard_error() {
    init_test_tracing();
    let test = spawn_router();
    let repository = local_repository("ns", "r1");
    test.register(&repository).await;
    test.k8s
        .add_pod(pod_with_mount("p1", "ns", "r1", "r1", LOCAL_TARGET))
        .await;
    test.k8s
        .push_exec_result(Ok(exec_success(b"[{\"metadata\": 42}")))
        .await;

    let err = test
        .router
        .list_snapshots(&repository, &[], false)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DeserializationError);
    assert!(err.detail().unwrap().starts_with("listing snapshots of ns/r1"));
}

#[tokio::test]
async fn forget_through_mounting_pod_ignores_output() {
    init_test_tracing();
    let test = spawn_router();
    let repository = local_repository("ns", "r1");
    test.register(&repository).await;
    test.k8s
        .add_pod(pod_with_mount("p1", "ns", "r1", "r1", LOCAL_TARGET))
        .await;
    test.k8s
        .push_exec_result(Ok(exec_success(b"not json at all")))
        .await;

    test.router
        .forget_snapshots(&repository, &ids(&["abc", "def"]), false)
        .await
        .unwrap();

    let commands = test.k8s.exec_commands().await;
    assert_eq!(commands[0].command[1], "forget");
    assert_eq!(&commands[0].command[4..], &["abc", "def"]);
}

#[tokio::test]
async fn failed_forget_in_mounting_pod_carries_remote_output() {
    init_test_tracing();
    let test = spawn_router();
    let repository = local_repository("ns", "r1");
    test.register(&repository).await;
    test.k8s
        .add_pod(pod_with_mount("p1", "ns", "r1", "r1", LOCAL_TARGET))
        .await;
    test.k8s
        .push_exec_result(Ok(exec_failure(
            "command terminated with non-zero exit code: exit status 1",
            b"Fatal: repository is already locked\n",
        )))
        .await;

    let err = test
        .router
        .forget_snapshots(&repository, &ids(&["abc"]), false)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExecFailed);
    let detail = err.detail().unwrap();
    assert!(detail.starts_with("forgetting snapshots of ns/r1"));
    assert!(detail.contains("reason: Fatal: repository is already locked"));
}

#[tokio::test]
async fn missing_mounting_pod_names_the_repository() {
    init_test_tracing();
    let test = spawn_router();
    let repository = local_repository("ns", "r1");
    test.register(&repository).await;
    // Declares the volume but mounts it elsewhere.
    test.k8s
        .add_pod(pod_with_mount("p1", "ns", "r1", "r1", "/mnt/other"))
        .await;

    let err = test
        .router
        .list_snapshots(&repository, &[], false)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MountingPodNotFound);
    assert!(err.detail().unwrap().contains("ns/r1"));
    assert!(test.k8s.exec_commands().await.is_empty());
}

#[tokio::test]
async fn scratch_directories_are_removed_after_every_call() {
    init_test_tracing();
    let test = spawn_router();
    let repository = s3_repository("ns", "r1");
    test.register(&repository).await;
    test.store
        .add_snapshot(S3_TARGET, backend_snapshot("aaaa1111", "h1"))
        .await;

    test.router
        .list_snapshots(&repository, &[], false)
        .await
        .unwrap();
    test.router
        .forget_snapshots(&repository, &ids(&["aaaa1111"]), false)
        .await
        .unwrap();
    test.store.fail_list_with("Fatal: wrong password or no key found").await;
    test.router
        .list_snapshots(&repository, &[], false)
        .await
        .unwrap_err();

    let scratch_dirs = test.store.scratch_dirs().await;
    assert!(!scratch_dirs.is_empty());
    for scratch_dir in scratch_dirs {
        assert!(scratch_dir.starts_with(test.scratch_root.path()));
        assert!(!scratch_dir.exists());
    }
    assert_eq!(test.scratch_entries(), 0);
}

#[tokio::test]
async fn missing_storage_secret_is_reported() {
    init_test_tracing();
    let test = spawn_router();
    let repository = s3_repository("ns", "r1");
    test.k8s.add_repository(repository.clone()).await;

    let err = test
        .router
        .list_snapshots(&repository, &[], false)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
    assert!(test.store.calls().await.is_empty());
    assert_eq!(test.scratch_entries(), 0);
}
