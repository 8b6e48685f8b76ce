//! Resolution of a [`LinkConfig`] into concrete clocks and cycle counts.
//!
//! Every duration in the configuration is converted into cycles of the clock
//! domain that will count it: the PLL-reset hold, the watchdog window, and the
//! serializer model delays are all counted by the lane domains.

use jesd_common::{Frequency, SimTime};
use serde::Serialize;

use crate::error::ConfigError;
use crate::types::{ConfigCrossing, JsyncKind, LaneDirection, LinkConfig};

/// Shortest PLL-reset hold the serializer PLL accepts.
pub const MIN_PLL_RESET: SimTime = SimTime {
    fs: 2 * jesd_common::time::FS_PER_US,
};

/// A resolved clock: frequency and the instant of its first edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClockSpec {
    /// Clock frequency.
    pub frequency: Frequency,
    /// Time of the first rising edge.
    pub phase: SimTime,
}

impl ClockSpec {
    /// Creates a clock with its first edge at time zero.
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            phase: SimTime::ZERO,
        }
    }
}

/// Serializer model delays in lane-clock cycles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhyTiming {
    /// Cycles from PLL reset release to lock.
    pub pll_lock_cycles: u64,
    /// Cycles from serializer reset release to reset-done.
    pub reset_done_cycles: u64,
    /// Cycles from the delay reset pulse to delay-alignment done.
    pub delay_align_done_cycles: u64,
    /// Cycles from delay-alignment done to the first phase-align-done rise.
    pub phase_align_first_cycles: u64,
    /// Width of the first phase-align-done pulse.
    pub phase_align_gap_cycles: u64,
    /// Low time before the final phase-align-done rise.
    pub phase_align_second_cycles: u64,
    /// Relative jitter applied to every delay.
    pub jitter: f64,
}

/// A fully resolved link description, ready to assemble.
///
/// All fields are public so tests and tools can adjust a resolved link
/// directly (for example shortening the watchdog window).
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedLink {
    /// Link name.
    pub name: String,
    /// Number of lanes.
    pub lanes: usize,
    /// Lane direction.
    pub direction: LaneDirection,
    /// Boundary buffer depth in words.
    pub buffer_depth: usize,
    /// Seed for random models.
    pub seed: u64,
    /// Control-domain clock.
    pub sys_clock: ClockSpec,
    /// Device-domain clock.
    pub jesd_clock: ClockSpec,
    /// One clock per lane domain.
    pub lane_clocks: Vec<ClockSpec>,
    /// PLL-reset hold in lane cycles.
    pub pll_reset_cycles: u64,
    /// Readiness watchdog window in lane cycles.
    pub watchdog_cycles: u64,
    /// CDR-stable wait in lane cycles; `Some` only for receive lanes.
    pub cdr_stable_cycles: Option<u64>,
    /// Flip-flop stages per synchronizer.
    pub sync_stages: usize,
    /// Crossing discipline for the test-pattern word.
    pub config_crossing: ConfigCrossing,
    /// Whether synchronizers model random resolution delay.
    pub metastability: bool,
    /// JSYNC input shape, if wired.
    pub jsync: Option<JsyncKind>,
    /// Whether JREF is wired.
    pub jref: bool,
    /// Serializer model delays.
    pub phy: PhyTiming,
    /// Lanes whose PLL never locks in the serializer model.
    pub stuck_lanes: Vec<usize>,
    /// Local multiframe clock period in device cycles.
    pub multiframe_cycles: u64,
    /// Initial lane alignment sequence length in device cycles.
    pub ilas_cycles: u64,
}

/// Resolves a validated configuration into clocks and cycle counts.
pub fn resolve_link(config: &LinkConfig) -> Result<ResolvedLink, ConfigError> {
    let sys = parse_frequency("clocks.sys", &config.clocks.sys)?;
    let jesd = parse_frequency("clocks.jesd", &config.clocks.jesd)?;
    let lane = parse_frequency("clocks.lane", &config.clocks.lane)?;

    let lanes = config.link.lanes as usize;
    let mut lane_clocks = vec![ClockSpec::new(lane); lanes];
    for (i, phase) in config.clocks.lane_phase.iter().enumerate() {
        lane_clocks[i].phase = parse_time(&format!("clocks.lane_phase[{i}]"), phase)?;
    }

    let pll_reset = parse_time("timing.pll_reset", &config.timing.pll_reset)?;
    if pll_reset < MIN_PLL_RESET {
        return Err(ConfigError::InvalidValue {
            field: "timing.pll_reset".to_string(),
            reason: format!("hold must be at least {MIN_PLL_RESET}, got {pll_reset}"),
        });
    }
    let watchdog = parse_time("timing.watchdog", &config.timing.watchdog)?;
    let watchdog_cycles = lane.cycles_in(watchdog);
    if watchdog_cycles == 0 {
        return Err(ConfigError::ValidationError(
            "timing.watchdog must span at least one lane cycle".to_string(),
        ));
    }

    let phy_cfg = &config.phy;
    let lane_cycles = |field: &str, value: &str| -> Result<u64, ConfigError> {
        Ok(lane.cycles_in(parse_time(field, value)?))
    };
    let phy = PhyTiming {
        pll_lock_cycles: lane_cycles("phy.pll_lock", &phy_cfg.pll_lock)?,
        reset_done_cycles: lane_cycles("phy.reset_done", &phy_cfg.reset_done)?,
        delay_align_done_cycles: lane_cycles("phy.delay_align_done", &phy_cfg.delay_align_done)?,
        phase_align_first_cycles: lane_cycles(
            "phy.phase_align_first",
            &phy_cfg.phase_align_first,
        )?,
        phase_align_gap_cycles: lane_cycles("phy.phase_align_gap", &phy_cfg.phase_align_gap)?,
        phase_align_second_cycles: lane_cycles(
            "phy.phase_align_second",
            &phy_cfg.phase_align_second,
        )?,
        jitter: phy_cfg.jitter,
    };

    let multiframe_cycles = u64::from(config.link_layer.frames_per_multiframe);

    Ok(ResolvedLink {
        name: config.link.name.clone(),
        lanes,
        direction: config.link.direction,
        buffer_depth: config.link.buffer_depth as usize,
        seed: config.link.seed,
        sys_clock: ClockSpec::new(sys),
        jesd_clock: ClockSpec::new(jesd),
        lane_clocks,
        pll_reset_cycles: lane.cycles_in(pll_reset),
        watchdog_cycles,
        cdr_stable_cycles: match config.link.direction {
            LaneDirection::Rx => Some(config.timing.cdr_stable_cycles),
            LaneDirection::Tx => None,
        },
        sync_stages: config.cdc.stages as usize,
        config_crossing: config.cdc.config_crossing,
        metastability: config.cdc.metastability,
        jsync: config.wiring.jsync,
        jref: config.wiring.jref,
        phy,
        stuck_lanes: phy_cfg.stuck_lanes.iter().map(|&l| l as usize).collect(),
        multiframe_cycles,
        ilas_cycles: u64::from(config.link_layer.ilas_multiframes) * multiframe_cycles,
    })
}

fn parse_frequency(field: &str, value: &str) -> Result<Frequency, ConfigError> {
    let freq: Frequency = value.parse().map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        reason: format!("{e}"),
    })?;
    if !freq.is_usable() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("frequency must be positive, got {freq}"),
        });
    }
    Ok(freq)
}

fn parse_time(field: &str, value: &str) -> Result<SimTime, ConfigError> {
    value.parse().map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        reason: format!("{e}"),
    })
}
