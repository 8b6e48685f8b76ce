//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::LinkConfig;
use std::path::Path;

/// Default configuration file name looked up by the CLI.
pub const CONFIG_FILE_NAME: &str = "link.toml";

/// Loads and validates a link configuration from a file path.
pub fn load_config(path: &Path) -> Result<LinkConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Parses and validates a link configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<LinkConfig, ConfigError> {
    let config: LinkConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates required fields and value ranges that do not need unit parsing.
fn validate_config(config: &LinkConfig) -> Result<(), ConfigError> {
    let link = &config.link;
    if link.name.is_empty() {
        return Err(ConfigError::MissingField("link.name".to_string()));
    }
    if link.lanes == 0 {
        return Err(ConfigError::ValidationError(
            "link.lanes must be at least 1".to_string(),
        ));
    }
    if link.buffer_depth < 2 || !link.buffer_depth.is_power_of_two() {
        return Err(ConfigError::ValidationError(format!(
            "link.buffer_depth must be a power of two >= 2, got {}",
            link.buffer_depth
        )));
    }
    if config.cdc.stages < 2 {
        return Err(ConfigError::ValidationError(format!(
            "cdc.stages must be at least 2, got {}",
            config.cdc.stages
        )));
    }
    if config.clocks.lane_phase.len() > link.lanes as usize {
        return Err(ConfigError::ValidationError(format!(
            "clocks.lane_phase has {} entries for {} lanes",
            config.clocks.lane_phase.len(),
            link.lanes
        )));
    }
    if !(0.0..1.0).contains(&config.phy.jitter) {
        return Err(ConfigError::ValidationError(format!(
            "phy.jitter must be in [0, 1), got {}",
            config.phy.jitter
        )));
    }
    if let Some(lane) = config.phy.stuck_lanes.iter().find(|&&l| l >= link.lanes) {
        return Err(ConfigError::ValidationError(format!(
            "phy.stuck_lanes names lane {lane}, but the link has {} lanes",
            link.lanes
        )));
    }
    if config.link_layer.frames_per_multiframe == 0 {
        return Err(ConfigError::ValidationError(
            "link_layer.frames_per_multiframe must be at least 1".to_string(),
        ));
    }
    Ok(())
}
