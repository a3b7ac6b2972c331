use std::error;
use std::fmt;

use crate::k8s::K8sError;

/// Result type of every fallible snapshot access operation.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Error returned by the snapshot access layer.
///
/// Carries an [`ErrorKind`] for programmatic handling, a static description and,
/// optionally, a dynamic detail with the context needed to surface the failure to
/// an end user (repository, operation, captured backend output).
#[derive(Debug, Clone)]
pub struct SnapshotError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
}

/// Categories of failures, grouped by the component that raises them.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration Errors
    ConfigError,
    InvalidRepository,
    MissingCredentials,

    // Backend Client Errors
    BackendCommandFailed,
    BackendOutputInvalid,
    AmbiguousSnapshotId,

    // Cluster Errors
    KubernetesApiFailed,
    ResourceNotFound,
    MountingPodNotFound,

    // Exec Transport Errors
    ExecFailed,
    ExecTimedOut,

    // IO & Deserialization Errors
    IoError,
    DeserializationError,
}

impl SnapshotError {
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
        }
    }

    pub fn description(&self) -> &'static str {
        match self.repr {
            ErrorRepr::WithDescription(_, desc)
            | ErrorRepr::WithDescriptionAndDetail(_, desc, _) => desc,
        }
    }

    /// Returns the dynamic detail, if any.
    ///
    /// For backend failures this is the formatted backend client output, which is
    /// what the "repository not found" classification inspects.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::WithDescription(..) => None,
        }
    }

    /// Prefixes the detail with `context`, keeping kind and description.
    pub fn with_context(self, context: impl fmt::Display) -> SnapshotError {
        let (kind, desc, detail) = match self.repr {
            ErrorRepr::WithDescription(kind, desc) => (kind, desc, context.to_string()),
            ErrorRepr::WithDescriptionAndDetail(kind, desc, detail) => {
                (kind, desc, format!("{context}: {detail}"))
            }
        };

        SnapshotError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl PartialEq for SnapshotError {
    fn eq(&self, other: &SnapshotError) -> bool {
        self.kind() == other.kind()
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;
                f.write_str(" -> ")?;
                detail.fmt(f)
            }
        }
    }
}

impl error::Error for SnapshotError {}

impl From<(ErrorKind, &'static str)> for SnapshotError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> SnapshotError {
        SnapshotError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for SnapshotError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> SnapshotError {
        SnapshotError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(err: std::io::Error) -> SnapshotError {
        SnapshotError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "I/O error occurred",
                err.to_string(),
            ),
        }
    }
}

/// Maps syntax, data and EOF failures to [`ErrorKind::DeserializationError`].
impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> SnapshotError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        SnapshotError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

impl From<K8sError> for SnapshotError {
    fn from(err: K8sError) -> SnapshotError {
        let (kind, description) = match err {
            K8sError::NotFound { .. } => (
                ErrorKind::ResourceNotFound,
                "Kubernetes resource not found",
            ),
            K8sError::Exec(_) => (ErrorKind::ExecFailed, "Pod exec stream failed"),
            K8sError::Kube(_) => (
                ErrorKind::KubernetesApiFailed,
                "Kubernetes API request failed",
            ),
        };

        SnapshotError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}
