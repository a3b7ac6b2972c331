use serde::{Deserialize, Serialize};

use crate::shared::{ExecConfig, ResticConfig, ValidationError};

/// Complete configuration of the snapshot access layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SnapshotAccessConfig {
    /// How commands are run inside mounting pods.
    pub exec: ExecConfig,
    /// How the restic backend client is invoked.
    pub restic: ResticConfig,
}

impl SnapshotAccessConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.exec.validate()?;
        self.restic.validate()
    }
}
