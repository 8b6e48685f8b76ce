//! `jesdsim init`: writes a starter `link.toml`.
//!
//! The file lists every section with its default values so it doubles as a
//! reference for the available settings.

use std::fs;
use std::path::{Path, PathBuf};

use jesd_config::CONFIG_FILE_NAME;

use crate::GlobalArgs;

/// Runs the `jesdsim init` command.
///
/// Writes into the `--config` directory if given, otherwise the current
/// directory. Refuses to overwrite an existing file.
pub fn run(
    name: Option<String>,
    lanes: u32,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    if lanes == 0 {
        return Err("a link needs at least one lane".into());
    }

    let dir = match global.config {
        Some(ref p) => PathBuf::from(p),
        None => std::env::current_dir()?,
    };
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(format!("'{}' already exists", path.display()).into());
    }
    fs::create_dir_all(&dir)?;

    let name = name.unwrap_or_else(|| default_name(&dir));
    fs::write(&path, template(&name, lanes))?;

    if !global.quiet {
        eprintln!("     Created {}", path.display());
    }
    Ok(0)
}

fn default_name(dir: &Path) -> String {
    dir.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("link0")
        .to_string()
}

/// Renders the starter configuration.
fn template(name: &str, lanes: u32) -> String {
    let phases = (0..lanes)
        .map(|_| "\"0ns\"")
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"[link]
name = "{name}"
lanes = {lanes}
direction = "tx"
buffer_depth = 4
seed = 0

[clocks]
sys = "125MHz"
jesd = "250MHz"
lane = "250MHz"
lane_phase = [{phases}]

[timing]
pll_reset = "2us"
watchdog = "1ms"
cdr_stable_cycles = 1024

[cdc]
stages = 2
config_crossing = "per-bit"
metastability = false

[wiring]
jsync = {{ kind = "signal" }}
jref = true

[phy]
pll_lock = "10us"
reset_done = "1us"
delay_align_done = "200ns"
phase_align_first = "400ns"
phase_align_gap = "100ns"
phase_align_second = "400ns"
jitter = 0.0
stuck_lanes = []

[link_layer]
ilas_multiframes = 4
frames_per_multiframe = 32
"#
    )
}
