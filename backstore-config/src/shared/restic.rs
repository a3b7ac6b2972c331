use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::shared::ValidationError;

/// Settings for the restic backend client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResticConfig {
    /// Binary name or path of restic, resolved through `PATH` when relative.
    pub binary: PathBuf,
    /// Keeps a restic cache inside the per-call scratch directory when enabled.
    ///
    /// The scratch directory is removed after every call, so the cache never
    /// outlives a single request.
    pub enable_cache: bool,
    /// Parent directory for per-call scratch directories.
    ///
    /// Defaults to the system temporary directory.
    pub scratch_root: Option<PathBuf>,
}

impl ResticConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.binary.as_os_str().is_empty() {
            return Err(ValidationError::ResticBinaryEmpty);
        }

        Ok(())
    }
}

impl Default for ResticConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("restic"),
            enable_cache: false,
            scratch_root: None,
        }
    }
}
