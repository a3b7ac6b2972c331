//! Resolution of a [`crate::types::Repository`] into something a backend client can
//! talk to: its storage location, its credentials, and a private scratch directory.

mod credentials;
mod target;

pub use credentials::*;
pub use target::*;
