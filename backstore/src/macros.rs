//! Shorthands for building and returning [`crate::error::SnapshotError`]s.

/// Creates a [`crate::error::SnapshotError`] from a kind, a static description and
/// an optional detail.
#[macro_export]
macro_rules! snapshot_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::SnapshotError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::SnapshotError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Returns early with a [`crate::error::SnapshotError`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::snapshot_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::snapshot_error!($kind, $desc, $detail))
    };
}
