//! Snapshot store clients: list, delete and existence checks against a resolved
//! [`crate::backend::BackendTarget`], with no cluster awareness.

mod base;
mod classify;
mod restic;

pub use base::*;
pub use classify::*;
pub use restic::*;
