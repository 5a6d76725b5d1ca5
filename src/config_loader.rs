use crate::config::Config;
use color_eyre::eyre::{Context, Result};
use log::{info, warn};
use std::fs::File;
use std::path::Path;

/// Load and validate an analysis configuration from a YAML file.
///
/// When `general.base_dir` is not set, relative scenario paths resolve
/// against the directory holding the configuration file.
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .with_context(|| format!("Failed to open configuration file: {}", config_path.display()))?;

    let mut config: Config = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse configuration file: {}", config_path.display()))?;

    if config.general.base_dir.is_none() {
        config.general.base_dir = config_path.parent().map(|p| p.to_path_buf());
    }

    config.validate()?;

    if config.baseline().is_none() {
        warn!("No baseline scenario configured; anomaly detection will be skipped");
    }

    info!(
        "Loaded {} scenarios, decoder: {:?}",
        config.scenarios.len(),
        config.capture.decoder
    );

    Ok(config)
}
