use backstore_config::load_config;
use backstore_config::shared::SnapshotAccessConfig;

/// Loads the [`SnapshotAccessConfig`] and validates it.
pub fn load_access_config() -> anyhow::Result<SnapshotAccessConfig> {
    let config = load_config::<SnapshotAccessConfig>()?;
    config.validate()?;

    Ok(config)
}
