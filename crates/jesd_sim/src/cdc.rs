//! Cross-domain synchronizers.
//!
//! [`BitSync`] is the multi-stage flip-flop chain every cross-domain read goes
//! through: the source value is captured by the first stage on a destination
//! tick and walks down the chain, and the destination logic only ever reads
//! the last, settled stage. [`BusSync`] carries a multi-bit word as one
//! `BitSync` per bit.
//!
//! Real synchronizers can resolve a metastable capture either way. When
//! enabled, that is modeled as a random one-tick delay for a bit whose input
//! changed since the previous capture; the delay is never applied twice in a
//! row, so latency stays bounded by `stages + 1`.

use jesd_config::ConfigCrossing;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fewest registers a synchronizer is built with.
pub const MIN_SYNC_STAGES: usize = 2;

/// A value crossing into a destination domain through a chain of registers.
#[derive(Debug, Clone)]
pub struct BitSync<T> {
    stages: Vec<T>,
    resolver: Option<StdRng>,
    deferred: bool,
}

impl<T: Copy + PartialEq> BitSync<T> {
    /// Creates a synchronizer with `stages` registers, all holding `init`.
    ///
    /// A chain shorter than [`MIN_SYNC_STAGES`] is built with that many.
    pub fn new(stages: usize, init: T) -> Self {
        Self {
            stages: vec![init; stages.max(MIN_SYNC_STAGES)],
            resolver: None,
            deferred: false,
        }
    }

    /// Enables random one-tick resolution delay, seeded for reproducibility.
    pub fn with_metastability(mut self, seed: u64) -> Self {
        self.resolver = Some(StdRng::seed_from_u64(seed));
        self
    }

    /// Number of destination ticks before a steady source value is visible
    /// (without metastability delay).
    pub fn latency(&self) -> usize {
        self.stages.len()
    }

    /// Returns the settled value the destination logic sees this tick.
    pub fn value(&self) -> T {
        self.stages[self.stages.len() - 1]
    }

    /// Clocks the chain once with the current source value.
    ///
    /// Returns the settled value as it was before this edge, which is what the
    /// destination logic evaluated during the tick.
    pub fn observe(&mut self, source: T) -> T {
        let settled = self.value();
        let mut captured = source;
        if let Some(rng) = self.resolver.as_mut() {
            if source != self.stages[0] && !self.deferred && rng.gen_bool(0.5) {
                captured = self.stages[0];
                self.deferred = true;
            } else {
                self.deferred = false;
            }
        }
        self.stages.rotate_right(1);
        self.stages[0] = captured;
        settled
    }
}

/// A multi-bit word crossing as independent per-bit synchronizers.
///
/// With [`ConfigCrossing::PerBit`] the output is the raw per-bit result, which
/// can be a torn mix of old and new bits for a tick while the word changes.
/// With [`ConfigCrossing::Latched`] the output only updates once the same
/// word has been settled on two consecutive ticks.
#[derive(Debug, Clone)]
pub struct BusSync {
    bits: Vec<BitSync<bool>>,
    crossing: ConfigCrossing,
    previous: Option<u32>,
    latched: u32,
}

impl BusSync {
    /// Creates a `width`-bit synchronizer holding `init`.
    pub fn new(width: u32, stages: usize, crossing: ConfigCrossing, init: u32) -> Self {
        let bits = (0..width)
            .map(|i| BitSync::new(stages, (init >> i) & 1 == 1))
            .collect();
        Self {
            bits,
            crossing,
            previous: None,
            latched: init,
        }
    }

    /// Enables metastability modeling on every bit, each with its own seed.
    pub fn with_metastability(mut self, seed: u64) -> Self {
        self.bits = self
            .bits
            .into_iter()
            .enumerate()
            .map(|(i, b)| b.with_metastability(seed.wrapping_add(i as u64)))
            .collect();
        self
    }

    /// Clocks every bit once; returns the word the destination sees this tick.
    pub fn observe(&mut self, word: u32) -> u32 {
        let raw = self
            .bits
            .iter_mut()
            .enumerate()
            .fold(0u32, |acc, (i, bit)| {
                acc | u32::from(bit.observe((word >> i) & 1 == 1)) << i
            });
        match self.crossing {
            ConfigCrossing::PerBit => raw,
            ConfigCrossing::Latched => {
                if self.previous == Some(raw) {
                    self.latched = raw;
                }
                self.previous = Some(raw);
                self.latched
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_stage_latency() {
        let mut s = BitSync::new(2, false);
        assert!(!s.observe(true));
        assert!(!s.observe(true));
        assert!(s.observe(true));
        assert_eq!(s.latency(), 2);
    }

    #[test]
    fn three_stage_latency() {
        let mut s = BitSync::new(3, 0u8);
        let seen: Vec<u8> = (0..5).map(|_| s.observe(7)).collect();
        assert_eq!(seen, vec![0, 0, 0, 7, 7]);
    }

    #[test]
    fn short_chains_get_two_stages() {
        for stages in [0, 1] {
            let mut s = BitSync::new(stages, false);
            assert_eq!(s.latency(), MIN_SYNC_STAGES);
            assert!(!s.observe(true));
            assert!(!s.observe(true));
            assert!(s.observe(true));
        }
    }

    #[test]
    fn value_reflects_settled_stage() {
        let mut s = BitSync::new(2, false);
        s.observe(true);
        assert!(!s.value());
        s.observe(true);
        assert!(s.value());
    }

    #[test]
    fn output_is_always_a_held_source_value() {
        let mut s = BitSync::new(2, 0u32).with_metastability(9);
        let inputs = [1u32, 1, 2, 2, 2, 3, 3, 4, 4, 4, 4];
        for (tick, &x) in inputs.iter().enumerate() {
            let out = s.observe(x);
            assert!(out == 0 || inputs[..tick].contains(&out));
        }
    }

    #[test]
    fn metastability_delay_is_bounded() {
        for seed in 0..16 {
            let mut s = BitSync::new(2, false).with_metastability(seed);
            let mut seen_at = None;
            for tick in 0..10 {
                if s.observe(true) {
                    seen_at = Some(tick);
                    break;
                }
            }
            let tick = seen_at.expect("value must cross");
            assert!((2..=3).contains(&tick), "seed {seed} crossed at {tick}");
        }
    }

    #[test]
    fn bus_crosses_whole_word() {
        let mut bus = BusSync::new(4, 2, ConfigCrossing::PerBit, 0);
        bus.observe(0b1010);
        bus.observe(0b1010);
        assert_eq!(bus.observe(0b1010), 0b1010);
    }

    #[test]
    fn per_bit_crossing_can_tear() {
        let torn = (0..32).any(|seed| {
            let mut bus =
                BusSync::new(4, 2, ConfigCrossing::PerBit, 0).with_metastability(seed * 17);
            (0..6).any(|_| {
                let w = bus.observe(0b1111);
                w != 0 && w != 0b1111
            })
        });
        assert!(torn, "independent bit crossings should occasionally tear");
    }

    #[test]
    fn latched_crossing_never_tears() {
        for seed in 0..32 {
            let mut bus =
                BusSync::new(4, 2, ConfigCrossing::Latched, 0).with_metastability(seed * 17);
            let mut last = 0;
            for _ in 0..8 {
                last = bus.observe(0b1111);
                assert!(last == 0 || last == 0b1111, "seed {seed} tore to {last:#06b}");
            }
            assert_eq!(last, 0b1111);
        }
    }
}
