//! Configuration management for the snapshot access layer.
//!
//! Provides environment detection, layered configuration loading from YAML files
//! and environment variables, and the shared configuration types consumed by the
//! `backstore` library and the in-pod executable.

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;
