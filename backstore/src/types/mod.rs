mod repository;
mod snapshot;

pub use repository::*;
pub use snapshot::*;
