//! Link assembly and driving errors.
//!
//! Bring-up failures are never errors: a lane that does not come up is
//! reported as "not ready". These variants cover faults in how the link was
//! assembled or driven, all of which are detected before or outside of a tick.

use std::io;

use jesd_config::ConfigError;

/// Errors that can occur while assembling or driving a link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The link was assembled with no lanes.
    #[error("link must have at least one lane")]
    NoLanes,

    /// The boundary buffer depth is not a power of two of at least 2.
    #[error("boundary buffer depth must be a power of two >= 2, got {0}")]
    InvalidBufferDepth(usize),

    /// A synchronizer was requested with fewer than two stages.
    #[error("synchronizer needs at least 2 stages, got {0}")]
    TooFewSyncStages(usize),

    /// The number of per-lane clocks or collaborators does not match the lane count.
    #[error("expected {expected} {what}, got {got}")]
    LaneCountMismatch {
        /// What was counted (e.g. "lane clocks", "serializers").
        what: &'static str,
        /// The link's lane count.
        expected: usize,
        /// The number supplied.
        got: usize,
    },

    /// A required external input was not registered before finalization.
    #[error("{0} must be registered before the link is finalized")]
    MissingWiring(&'static str),

    /// JSYNC was driven with a level of a different shape than registered.
    #[error("JSYNC registered as {registered} but driven as {driven}")]
    JsyncShapeMismatch {
        /// The registered input shape.
        registered: &'static str,
        /// The shape of the driven level.
        driven: &'static str,
    },

    /// The configuration could not be loaded or resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An I/O error occurred while writing waveform data.
    #[error("waveform I/O error: {0}")]
    WaveformIo(#[from] io::Error),
}
