//! Shared helpers for CLI commands: config file resolution, loading, and
//! duration parsing.

use std::path::{Path, PathBuf};

use jesd_common::SimTime;
use jesd_config::{load_config, resolve_link, ResolvedLink, CONFIG_FILE_NAME};

use crate::GlobalArgs;

/// Walks up from `start` looking for the nearest `link.toml`.
pub fn find_config_file(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE_NAME} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the config file path from global CLI args.
///
/// `--config` may name the file itself or the directory that holds it.
/// Without it, walks up from the current directory.
pub fn resolve_config_path(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match global.config {
        Some(ref path) => {
            let p = PathBuf::from(path);
            if p.is_dir() {
                Ok(p.join(CONFIG_FILE_NAME))
            } else {
                Ok(p)
            }
        }
        None => find_config_file(&std::env::current_dir()?),
    }
}

/// Loads, validates, and resolves the link configuration.
pub fn load_link(global: &GlobalArgs) -> Result<(PathBuf, ResolvedLink), Box<dyn std::error::Error>> {
    let path = resolve_config_path(global)?;
    let config = load_config(&path).map_err(|e| format!("{}: {e}", path.display()))?;
    let settings = resolve_link(&config)?;
    Ok((path, settings))
}

/// Parses a duration such as `"2ms"` given on the command line.
pub fn parse_duration(s: &str) -> Result<SimTime, Box<dyn std::error::Error>> {
    s.parse::<SimTime>()
        .map_err(|e| format!("invalid duration '{s}': {e}").into())
}
