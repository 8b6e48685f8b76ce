//! Serializer boundary: control and status lines, and a behavioral model.
//!
//! The physical serializer is an external collaborator. [`SerdesPhy`] is the
//! surface the lane bring-up drives; [`GtxModel`] is a small behavioral
//! stand-in that answers the bring-up sequence with configurable delays,
//! optional jitter, and a stuck-PLL fault, and carries the built-in PRBS
//! test-pattern generators.

use std::collections::VecDeque;

use jesd_config::PhyTiming;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::transport::LaneWord;

/// Number of transmitted words a [`GtxModel`] remembers.
pub const HISTORY_DEPTH: usize = 64;

/// Control lines driven by the bring-up machine into the serializer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhyControl {
    /// PLL reset.
    pub pll_reset: bool,
    /// Serializer (transmitter) reset.
    pub serdes_reset: bool,
    /// Delay-alignment reset.
    pub delay_reset: bool,
}

/// Asynchronous status lines reported by the serializer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhyStatus {
    /// PLL locked.
    pub pll_lock: bool,
    /// Serializer reset sequence complete.
    pub reset_done: bool,
    /// Delay-alignment reset complete.
    pub delay_reset_done: bool,
    /// Phase alignment done.
    pub phase_align_done: bool,
}

/// One lane's physical serializer, clocked by the lane domain.
pub trait SerdesPhy {
    /// Current status lines. Asynchronous to every consumer.
    fn status(&self) -> PhyStatus;

    /// Advances the serializer one lane-clock edge.
    ///
    /// `test_pattern` is the synchronized 4-bit pattern select; `word` is the
    /// payload presented on the data port this edge.
    fn tick(&mut self, control: PhyControl, test_pattern: u8, word: LaneWord);

    /// The most recently transmitted words, oldest first.
    fn recent_words(&self) -> Vec<LaneWord>;
}

/// Built-in pseudo-random bit sequence generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrbsKind {
    /// x^7 + x^6 + 1
    Prbs7,
    /// x^15 + x^14 + 1
    Prbs15,
    /// x^23 + x^18 + 1
    Prbs23,
    /// x^31 + x^28 + 1
    Prbs31,
}

impl PrbsKind {
    /// Decodes a test-pattern select value; anything unassigned is "off".
    pub fn from_select(select: u8) -> Option<Self> {
        match select {
            1 => Some(PrbsKind::Prbs7),
            2 => Some(PrbsKind::Prbs15),
            3 => Some(PrbsKind::Prbs23),
            4 => Some(PrbsKind::Prbs31),
            _ => None,
        }
    }

    fn taps(self) -> (u32, u32) {
        match self {
            PrbsKind::Prbs7 => (7, 6),
            PrbsKind::Prbs15 => (15, 14),
            PrbsKind::Prbs23 => (23, 18),
            PrbsKind::Prbs31 => (31, 28),
        }
    }

    /// Sequence length in bits.
    pub fn period(self) -> u64 {
        (1u64 << self.taps().0) - 1
    }
}

/// Fibonacci LFSR producing 32 PRBS bits per word, first bit in bit 0.
#[derive(Debug, Clone)]
pub struct PrbsGenerator {
    kind: PrbsKind,
    state: u32,
}

impl PrbsGenerator {
    /// Creates a generator seeded with all ones.
    pub fn new(kind: PrbsKind) -> Self {
        let (order, _) = kind.taps();
        Self {
            kind,
            state: (1u32 << order) - 1,
        }
    }

    /// The selected polynomial.
    pub fn kind(&self) -> PrbsKind {
        self.kind
    }

    /// Shifts one bit out.
    pub fn next_bit(&mut self) -> bool {
        let (order, tap) = self.kind.taps();
        let mask = (1u32 << order) - 1;
        let bit = ((self.state >> (order - 1)) ^ (self.state >> (tap - 1))) & 1;
        self.state = ((self.state << 1) | bit) & mask;
        bit == 1
    }

    /// Shifts a full word out.
    pub fn next_word(&mut self) -> u32 {
        (0..32).fold(0, |acc, i| acc | u32::from(self.next_bit()) << i)
    }
}

#[derive(Debug, Clone, Copy)]
struct Delays {
    pll_lock: u64,
    reset_done: u64,
    delay_align_done: u64,
    phase_first: u64,
    phase_gap: u64,
    phase_second: u64,
}

/// Behavioral transceiver model answering the bring-up sequence.
///
/// - the PLL locks `pll_lock` cycles after PLL reset is released (never, if
///   the lane is stuck);
/// - reset-done rises `reset_done` cycles after the serializer reset is
///   released with the PLL locked;
/// - delay-align-done rises `delay_align_done` cycles after the delay reset
///   pulse;
/// - phase-align-done then pulses high for `phase_align_gap` cycles after
///   `phase_align_first`, drops for `phase_align_second`, and rises for good.
///
/// With non-zero jitter every delay is redrawn (uniform, relative) whenever
/// the PLL is put back into reset.
#[derive(Debug, Clone)]
pub struct GtxModel {
    timing: PhyTiming,
    delays: Delays,
    rng: StdRng,
    stuck: bool,
    in_pll_reset: bool,
    pll_count: u64,
    locked: bool,
    reset_count: u64,
    reset_done: bool,
    delay_count: Option<u64>,
    delay_done: bool,
    phase_count: u64,
    phase_done: bool,
    prbs: Option<PrbsGenerator>,
    history: VecDeque<LaneWord>,
}

impl GtxModel {
    /// Creates a model with the given delays, seeding its jitter source.
    pub fn new(timing: &PhyTiming, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let delays = Self::draw_delays(timing, &mut rng);
        Self {
            timing: timing.clone(),
            delays,
            rng,
            stuck: false,
            in_pll_reset: false,
            pll_count: 0,
            locked: false,
            reset_count: 0,
            reset_done: false,
            delay_count: None,
            delay_done: false,
            phase_count: 0,
            phase_done: false,
            prbs: None,
            history: VecDeque::with_capacity(HISTORY_DEPTH),
        }
    }

    /// Makes the PLL never lock.
    pub fn stuck(mut self) -> Self {
        self.stuck = true;
        self
    }

    /// The active PRBS generator, if a pattern is selected.
    pub fn prbs(&self) -> Option<PrbsKind> {
        self.prbs.as_ref().map(PrbsGenerator::kind)
    }

    fn draw_delays(timing: &PhyTiming, rng: &mut StdRng) -> Delays {
        let jitter = timing.jitter;
        let mut draw = |base: u64| -> u64 {
            if jitter <= 0.0 {
                return base.max(1);
            }
            let scale = 1.0 + rng.gen_range(-jitter..=jitter);
            ((base as f64 * scale).round() as u64).max(1)
        };
        Delays {
            pll_lock: draw(timing.pll_lock_cycles),
            reset_done: draw(timing.reset_done_cycles),
            delay_align_done: draw(timing.delay_align_done_cycles),
            phase_first: draw(timing.phase_align_first_cycles),
            phase_gap: draw(timing.phase_align_gap_cycles),
            phase_second: draw(timing.phase_align_second_cycles),
        }
    }

    fn clear_alignment(&mut self) {
        self.delay_count = None;
        self.delay_done = false;
        self.phase_count = 0;
        self.phase_done = false;
    }
}

impl SerdesPhy for GtxModel {
    fn status(&self) -> PhyStatus {
        PhyStatus {
            pll_lock: self.locked,
            reset_done: self.reset_done,
            delay_reset_done: self.delay_done,
            phase_align_done: self.phase_done,
        }
    }

    fn tick(&mut self, control: PhyControl, test_pattern: u8, word: LaneWord) {
        if control.pll_reset {
            if !self.in_pll_reset {
                self.delays = Self::draw_delays(&self.timing, &mut self.rng);
            }
            self.pll_count = 0;
            self.locked = false;
        } else if !self.stuck && !self.locked {
            self.pll_count += 1;
            self.locked = self.pll_count >= self.delays.pll_lock;
        }
        self.in_pll_reset = control.pll_reset;

        if control.serdes_reset || !self.locked {
            self.reset_count = 0;
            self.reset_done = false;
            self.clear_alignment();
        } else if !self.reset_done {
            self.reset_count += 1;
            self.reset_done = self.reset_count >= self.delays.reset_done;
        }

        if control.delay_reset {
            self.clear_alignment();
            self.delay_count = Some(0);
        } else if let Some(count) = self.delay_count.as_mut() {
            if !self.delay_done {
                *count += 1;
                self.delay_done = *count >= self.delays.delay_align_done;
            }
        }

        if self.delay_done {
            let d = self.delays;
            self.phase_count = self.phase_count.saturating_add(1);
            let p = self.phase_count;
            let first_end = d.phase_first + d.phase_gap;
            self.phase_done =
                (d.phase_first..first_end).contains(&p) || p >= first_end + d.phase_second;
        }

        let select = PrbsKind::from_select(test_pattern & 0xF);
        if select != self.prbs() {
            self.prbs = select.map(PrbsGenerator::new);
        }
        if self.reset_done {
            let sent = match self.prbs.as_mut() {
                Some(lfsr) => LaneWord::data(lfsr.next_word()),
                None => word,
            };
            if self.history.len() == HISTORY_DEPTH {
                self.history.pop_front();
            }
            self.history.push_back(sent);
        }
    }

    fn recent_words(&self) -> Vec<LaneWord> {
        self.history.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(jitter: f64) -> PhyTiming {
        PhyTiming {
            pll_lock_cycles: 20,
            reset_done_cycles: 5,
            delay_align_done_cycles: 3,
            phase_align_first_cycles: 4,
            phase_align_gap_cycles: 2,
            phase_align_second_cycles: 4,
            jitter,
        }
    }

    const RUN: PhyControl = PhyControl {
        pll_reset: false,
        serdes_reset: false,
        delay_reset: false,
    };

    #[test]
    fn prbs7_is_maximal_length() {
        let mut lfsr = PrbsGenerator::new(PrbsKind::Prbs7);
        let start = lfsr.state;
        let ones = (0..127).filter(|_| lfsr.next_bit()).count();
        assert_eq!(lfsr.state, start);
        assert_eq!(ones, 64);
    }

    #[test]
    fn prbs15_period() {
        let mut lfsr = PrbsGenerator::new(PrbsKind::Prbs15);
        let start = lfsr.state;
        for n in 1..=PrbsKind::Prbs15.period() {
            lfsr.next_bit();
            if lfsr.state == start {
                assert_eq!(n, 32767);
                return;
            }
        }
        panic!("PRBS15 did not repeat");
    }

    #[test]
    fn select_decoding() {
        assert_eq!(PrbsKind::from_select(0), None);
        assert_eq!(PrbsKind::from_select(3), Some(PrbsKind::Prbs23));
        assert_eq!(PrbsKind::from_select(9), None);
    }

    #[test]
    fn locks_after_delay() {
        let mut phy = GtxModel::new(&timing(0.0), 1);
        phy.tick(PhyControl { pll_reset: true, ..RUN }, 0, LaneWord::default());
        for _ in 0..19 {
            phy.tick(RUN, 0, LaneWord::default());
            assert!(!phy.status().pll_lock);
        }
        phy.tick(RUN, 0, LaneWord::default());
        assert!(phy.status().pll_lock);
    }

    #[test]
    fn stuck_lane_never_locks() {
        let mut phy = GtxModel::new(&timing(0.0), 1).stuck();
        for _ in 0..1000 {
            phy.tick(RUN, 0, LaneWord::default());
        }
        assert_eq!(phy.status(), PhyStatus::default());
    }

    #[test]
    fn phase_align_gives_two_rising_edges() {
        let mut phy = GtxModel::new(&timing(0.0), 1);
        for _ in 0..30 {
            phy.tick(RUN, 0, LaneWord::default());
        }
        assert!(phy.status().reset_done);
        phy.tick(PhyControl { delay_reset: true, ..RUN }, 0, LaneWord::default());
        let mut samples = Vec::new();
        for _ in 0..20 {
            phy.tick(RUN, 0, LaneWord::default());
            samples.push(phy.status().phase_align_done);
        }
        let rises = samples.windows(2).filter(|w| !w[0] && w[1]).count();
        assert_eq!(rises, 2);
        assert!(samples[samples.len() - 1]);
    }

    #[test]
    fn jitter_stays_in_range() {
        let t = timing(0.5);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let d = GtxModel::draw_delays(&t, &mut rng);
            assert!((10..=30).contains(&d.pll_lock));
        }
    }

    #[test]
    fn transmits_prbs_when_selected() {
        let mut phy = GtxModel::new(&timing(0.0), 1);
        for _ in 0..30 {
            phy.tick(RUN, 1, LaneWord::data(0xDEAD_BEEF));
        }
        assert_eq!(phy.prbs(), Some(PrbsKind::Prbs7));
        let words = phy.recent_words();
        assert!(!words.is_empty());
        assert!(words.iter().all(|w| w.data != 0xDEAD_BEEF));
    }

    #[test]
    fn history_is_bounded() {
        let mut phy = GtxModel::new(&timing(0.0), 1);
        for i in 0..200 {
            phy.tick(RUN, 0, LaneWord::data(i));
        }
        let words = phy.recent_words();
        assert_eq!(words.len(), HISTORY_DEPTH);
        assert_eq!(words[HISTORY_DEPTH - 1].data, 199);
    }
}
