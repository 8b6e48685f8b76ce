//! Configuration types deserialized from `link.toml`.
//!
//! Frequencies and durations are kept as strings here and parsed during
//! resolution, so that error messages can name the offending field.

use serde::{Deserialize, Serialize};

/// The top-level link configuration parsed from `link.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Link identity and shape (name, lane count, direction, buffering).
    pub link: LinkMeta,
    /// Clock frequencies of the control, device, and lane domains.
    #[serde(default)]
    pub clocks: ClockConfig,
    /// Bring-up timing minimums and the readiness watchdog window.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Cross-domain synchronizer settings.
    #[serde(default)]
    pub cdc: CdcConfig,
    /// External JSYNC/JREF wiring.
    #[serde(default)]
    pub wiring: WiringConfig,
    /// Behavioral serializer model timing.
    #[serde(default)]
    pub phy: PhyModelConfig,
    /// Behavioral link-layer model settings.
    #[serde(default)]
    pub link_layer: LinkLayerConfig,
}

/// Core link metadata required in every `link.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkMeta {
    /// The link name, used in reports and waveform scopes.
    pub name: String,
    /// Number of lanes. Fixed for the lifetime of the link.
    pub lanes: u32,
    /// Whether the lanes transmit or receive.
    #[serde(default)]
    pub direction: LaneDirection,
    /// Depth of every lane's boundary buffer, in words.
    #[serde(default = "default_buffer_depth")]
    pub buffer_depth: u32,
    /// Seed for every random behavioral model.
    #[serde(default)]
    pub seed: u64,
}

fn default_buffer_depth() -> u32 {
    4
}

/// Lane direction. Receive lanes additionally wait for clock-data recovery to settle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneDirection {
    /// Transmit lanes (default).
    #[default]
    Tx,
    /// Receive lanes.
    Rx,
}

/// Clock frequencies, as strings such as `"125MHz"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Control (register) domain clock.
    pub sys: String,
    /// Device (link-layer) domain clock.
    pub jesd: String,
    /// Default clock of every lane domain.
    pub lane: String,
    /// Optional per-lane phase offsets relative to time zero, e.g. `"1ns"`.
    pub lane_phase: Vec<String>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            sys: "125MHz".into(),
            jesd: "250MHz".into(),
            lane: "250MHz".into(),
            lane_phase: Vec::new(),
        }
    }
}

/// Bring-up timing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Minimum PLL reset hold time.
    pub pll_reset: String,
    /// Readiness watchdog window.
    pub watchdog: String,
    /// CDR-stable wait on receive lanes, in lane cycles.
    pub cdr_stable_cycles: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pll_reset: "2us".into(),
            watchdog: "1ms".into(),
            cdr_stable_cycles: 1024,
        }
    }
}

/// How a multi-bit control word crosses into the lane domains.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigCrossing {
    /// Every bit through its own synchronizer; a word can be torn for a tick
    /// while it changes.
    #[default]
    PerBit,
    /// The lane latches a word only after it has settled identically for two
    /// consecutive lane ticks.
    Latched,
}

/// Cross-domain synchronizer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CdcConfig {
    /// Number of flip-flop stages per synchronizer.
    pub stages: u32,
    /// Crossing discipline for the test-pattern configuration word.
    pub config_crossing: ConfigCrossing,
    /// Whether synchronizers model a random one-tick resolution delay.
    pub metastability: bool,
}

impl Default for CdcConfig {
    fn default() -> Self {
        Self {
            stages: 2,
            config_crossing: ConfigCrossing::PerBit,
            metastability: false,
        }
    }
}

/// Electrical shape of the JSYNC input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JsyncKind {
    /// A single-ended signal already in logic form.
    Signal,
    /// A differential pair that must be decoded.
    Differential,
}

/// External input wiring.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WiringConfig {
    /// JSYNC input shape. Absent means JSYNC is not wired.
    pub jsync: Option<JsyncKind>,
    /// Whether the device-synchronous JREF reference is wired.
    pub jref: bool,
}

/// Behavioral serializer model timing, as durations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhyModelConfig {
    /// PLL lock time after PLL reset release.
    pub pll_lock: String,
    /// Reset-done time after serializer reset release.
    pub reset_done: String,
    /// Delay-alignment reset-done time after the delay reset pulse.
    pub delay_align_done: String,
    /// Time from delay-alignment done to the first phase-align-done rise.
    pub phase_align_first: String,
    /// How long the first phase-align-done pulse stays high.
    pub phase_align_gap: String,
    /// Low time before the second, final phase-align-done rise.
    pub phase_align_second: String,
    /// Relative jitter applied to every delay, in `[0, 1)`.
    pub jitter: f64,
    /// Lanes whose PLL never locks.
    pub stuck_lanes: Vec<u32>,
}

impl Default for PhyModelConfig {
    fn default() -> Self {
        Self {
            pll_lock: "10us".into(),
            reset_done: "1us".into(),
            delay_align_done: "200ns".into(),
            phase_align_first: "400ns".into(),
            phase_align_gap: "100ns".into(),
            phase_align_second: "400ns".into(),
            jitter: 0.0,
            stuck_lanes: Vec::new(),
        }
    }
}

/// Behavioral link-layer model settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkLayerConfig {
    /// Length of the initial lane alignment sequence, in multiframes.
    pub ilas_multiframes: u32,
    /// Device cycles per multiframe (the local multiframe clock period).
    pub frames_per_multiframe: u32,
}

impl Default for LinkLayerConfig {
    fn default() -> Self {
        Self {
            ilas_multiframes: 4,
            frames_per_multiframe: 32,
        }
    }
}
