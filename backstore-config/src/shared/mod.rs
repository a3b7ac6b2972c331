mod access;
mod base;
mod exec;
mod restic;

pub use access::*;
pub use base::*;
pub use exec::*;
pub use restic::*;
