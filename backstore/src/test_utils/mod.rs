//! In-memory collaborators and fixtures for testing the snapshot access layer.
//!
//! [`k8s::MockK8sClient`] stands in for the cluster, [`store::MemorySnapshotStore`]
//! for the backend client, and [`fixtures`] builds the repositories, pods and
//! secrets most tests start from.
pub mod fixtures;
pub mod k8s;
pub mod store;
