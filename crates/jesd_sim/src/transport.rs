//! Payload words and the transport-side payload sources.
//!
//! The transport layer itself is an external collaborator. The link only
//! needs a source of one 32-bit word per lane per device tick, which it can
//! switch to a built-in short test pattern (STPL).

use serde::Serialize;

/// One lane's word as it crosses the boundary buffer: four data octets and
/// a per-octet control (K-character) mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct LaneWord {
    /// Data octets, least significant first on the wire.
    pub data: u32,
    /// Control mask, one bit per data octet.
    pub ctrl: u8,
}

impl LaneWord {
    /// A plain data word with no control characters.
    pub fn data(data: u32) -> Self {
        Self { data, ctrl: 0 }
    }

    /// Four copies of the K-character `k`, all flagged as control.
    pub fn k_chars(k: u8) -> Self {
        Self {
            data: u32::from_le_bytes([k; 4]),
            ctrl: 0xF,
        }
    }
}

/// Produces the live transport payload, one word per lane per device tick.
pub trait PayloadSource {
    /// Returns the next payload word for `lane`.
    fn next_word(&mut self, lane: usize) -> u32;
}

/// A per-lane counter tagged with the lane index in the top nibble.
#[derive(Debug, Clone)]
pub struct RampSource {
    counters: Vec<u32>,
}

impl RampSource {
    /// Mask of the counter bits below the lane tag.
    pub const COUNTER_MASK: u32 = 0x0FFF_FFFF;

    /// Creates a ramp for `lanes` lanes, every counter at zero.
    pub fn new(lanes: usize) -> Self {
        Self {
            counters: vec![0; lanes],
        }
    }

    /// Lane index encoded in a ramp word.
    pub fn lane_of(word: u32) -> usize {
        (word >> 28) as usize
    }
}

impl PayloadSource for RampSource {
    fn next_word(&mut self, lane: usize) -> u32 {
        let counter = &mut self.counters[lane];
        let word = ((lane as u32 & 0xF) << 28) | (*counter & Self::COUNTER_MASK);
        *counter = counter.wrapping_add(1);
        word
    }
}

/// Short transport-layer test pattern: a constant, lane-tagged word.
///
/// Each octet carries `lane * 4 + position`, so a receiver can confirm lane
/// mapping and octet ordering without any payload of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct StplGenerator;

impl StplGenerator {
    /// Returns the pattern word for `lane`.
    pub fn word(lane: usize) -> u32 {
        let base = (lane as u8).wrapping_mul(4);
        u32::from_le_bytes([base, base.wrapping_add(1), base.wrapping_add(2), base.wrapping_add(3)])
    }
}

impl PayloadSource for StplGenerator {
    fn next_word(&mut self, lane: usize) -> u32 {
        Self::word(lane)
    }
}
