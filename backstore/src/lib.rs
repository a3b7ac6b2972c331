//! Snapshot access layer of the backstore backup platform.
//!
//! Lists and forgets the snapshots stored in a [`types::Repository`] backend and
//! normalizes them into cluster-facing [`types::Snapshot`]s. Remote backends are
//! reached directly through the restic backend client; local volumes, which only
//! pods mounting them can see, are reached by executing the same operations
//! inside the mounting pod. [`router::SnapshotRouter`] picks the path per call.
pub mod backend;
pub mod error;
pub mod exec;
pub mod k8s;
pub mod locator;
mod macros;
pub mod router;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
