//! `jesdsim check`: validates, resolves, and assembles the link without
//! running it, then prints the resolved cycle counts.

use jesd_config::ResolvedLink;
use jesd_sim::LinkBuilder;

use crate::pipeline::load_link;
use crate::{CheckArgs, GlobalArgs, ReportFormat};

/// Runs the `jesdsim check` command. Returns exit code 0 when the link
/// assembles.
pub fn run(args: &CheckArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (path, settings) = load_link(global)?;
    if !global.quiet {
        eprintln!("    Checking {}", path.display());
    }

    // Assembly catches wiring faults the config loader cannot see.
    LinkBuilder::from_settings(settings.clone()).build()?;

    match args.format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&settings)?),
        ReportFormat::Text => {
            if !global.quiet {
                print!("{}", render_text(&settings));
            }
        }
    }
    Ok(0)
}

fn render_text(s: &ResolvedLink) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "link {} ({} {:?} lanes, buffer depth {})\n",
        s.name, s.lanes, s.direction, s.buffer_depth
    ));
    out.push_str(&format!(
        "  clocks: sys {} / jesd {} / lane {}\n",
        s.sys_clock.frequency,
        s.jesd_clock.frequency,
        s.lane_clocks
            .first()
            .map(|c| c.frequency.to_string())
            .unwrap_or_default()
    ));
    out.push_str(&format!("  pll reset:   {} lane cycles\n", s.pll_reset_cycles));
    out.push_str(&format!("  watchdog:    {} lane cycles\n", s.watchdog_cycles));
    if let Some(cdr) = s.cdr_stable_cycles {
        out.push_str(&format!("  cdr stable:  {cdr} lane cycles\n"));
    }
    out.push_str(&format!("  sync stages: {}\n", s.sync_stages));
    out.push_str(&format!(
        "  phy: pll lock {} / reset done {} / delay align {} lane cycles\n",
        s.phy.pll_lock_cycles, s.phy.reset_done_cycles, s.phy.delay_align_done_cycles
    ));
    out.push_str(&format!(
        "  multiframe {} device cycles, ilas {} device cycles\n",
        s.multiframe_cycles, s.ilas_cycles
    ));
    if !s.stuck_lanes.is_empty() {
        out.push_str(&format!("  stuck lanes: {:?}\n", s.stuck_lanes));
    }
    out
}
