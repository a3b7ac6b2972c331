//! Kubernetes integration of the snapshot access layer.
//!
//! Everything that talks to the API server goes through the [`K8sClient`] trait:
//! reading credential secrets and `Repository` resources, listing pods, and
//! executing commands inside a pod over the exec subresource.
//!
//! [`HttpK8sClient`] is the production implementation, backed by [`kube`] and
//! using the ambient configuration (in-cluster service account or the local
//! kubeconfig). Tests use `test_utils::k8s::MockK8sClient` instead.

mod base;
mod http;

pub use base::*;
pub use http::*;
