use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The exec request deadline cannot be zero.
    #[error("`exec.timeout_secs` cannot be zero")]
    ExecTimeoutZero,
    /// The exec target container must be named.
    #[error("`exec.container` cannot be empty")]
    ExecContainerEmpty,
    /// The in-pod executable is invoked without a shell, so it needs an absolute path.
    #[error("`exec.executable` must be an absolute path, got `{0}`")]
    ExecExecutableNotAbsolute(String),
    /// The restic binary must be named.
    #[error("`restic.binary` cannot be empty")]
    ResticBinaryEmpty,
}
