use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::ValidationError;

/// Container, inside a mounting pod, that ships the in-pod executable.
pub const DEFAULT_EXEC_CONTAINER: &str = "backstore";

/// Path of the in-pod executable within [`DEFAULT_EXEC_CONTAINER`].
pub const DEFAULT_EXEC_EXECUTABLE: &str = "/backstore-exec";

/// Hard deadline of a single exec request.
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 5 * 60;

/// Settings for running the snapshot sub-protocol inside a mounting pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Name of the container the command is executed in.
    pub container: String,
    /// Absolute path of the executable invoked with the protocol verb.
    pub executable: String,
    /// Deadline for the whole exec round trip, in seconds.
    pub timeout_secs: u64,
    /// Whether a pseudo-terminal is requested for the exec session.
    ///
    /// With a terminal the remote side multiplexes stderr into stdout, so only
    /// one stream is captured.
    pub tty: bool,
}

impl ExecConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_secs == 0 {
            return Err(ValidationError::ExecTimeoutZero);
        }

        if self.container.is_empty() {
            return Err(ValidationError::ExecContainerEmpty);
        }

        if !self.executable.starts_with('/') {
            return Err(ValidationError::ExecExecutableNotAbsolute(
                self.executable.clone(),
            ));
        }

        Ok(())
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            container: DEFAULT_EXEC_CONTAINER.to_owned(),
            executable: DEFAULT_EXEC_EXECUTABLE.to_owned(),
            timeout_secs: DEFAULT_EXEC_TIMEOUT_SECS,
            tty: true,
        }
    }
}
