//! Per-lane serializer bring-up state machine.
//!
//! The machine runs in its lane's clock domain and walks the serializer
//! through PLL reset, serializer reset, delay alignment, and two-edge phase
//! alignment confirmation:
//!
//! ```text
//! RESET_ALL ──pll timer──▶ RELEASE_PLL_RESET ──lock──▶ RELEASE_SERDES_RESET
//!     ▲                                                      │ reset done (+ CDR timer on rx)
//!     │ restart / watchdog                                   ▼
//!   (any)    READY ◀─edge─ WAIT_SECOND ◀─edge─ WAIT_FIRST ◀─ WAIT_ALIGN ◀── ALIGN
//! ```
//!
//! Every serializer status line is asynchronous and crosses through a
//! [`BitSync`] before the machine looks at it. The serializer-reset and
//! delay-reset outputs are registered so the hardware never sees a
//! combinational glitch; the PLL reset is decoded straight from the state.
//!
//! `restart` acts as a synchronous reset of the machine. A readiness watchdog
//! counts every tick the lane is neither ready nor being restarted, and forces
//! the same reset when the window expires.

use serde::Serialize;
use std::fmt;

use crate::cdc::BitSync;
use crate::phy::{PhyControl, PhyStatus};
use crate::timer::WaitTimer;

/// Bring-up sequence position of one lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BringupState {
    /// Serializer and PLL held in reset while the PLL-reset timer runs.
    ResetAll,
    /// PLL released; waiting for lock.
    ReleasePllReset,
    /// Serializer released; waiting for reset-done.
    ReleaseSerdesReset,
    /// One-tick delay-alignment reset pulse.
    Align,
    /// Waiting for delay-alignment reset-done.
    WaitAlign,
    /// Waiting for the first rising edge of phase-align-done.
    WaitFirstAlignDone,
    /// Waiting for the second rising edge of phase-align-done.
    WaitSecondAlignDone,
    /// Bring-up complete.
    Ready,
}

impl BringupState {
    /// All states, in sequence order.
    pub const ALL: [BringupState; 8] = [
        BringupState::ResetAll,
        BringupState::ReleasePllReset,
        BringupState::ReleaseSerdesReset,
        BringupState::Align,
        BringupState::WaitAlign,
        BringupState::WaitFirstAlignDone,
        BringupState::WaitSecondAlignDone,
        BringupState::Ready,
    ];

    /// Position in the sequence, used as the waveform encoding.
    pub fn code(self) -> u64 {
        self as u64
    }

    /// Upper-case state name.
    pub fn name(self) -> &'static str {
        match self {
            BringupState::ResetAll => "RESET_ALL",
            BringupState::ReleasePllReset => "RELEASE_PLL_RESET",
            BringupState::ReleaseSerdesReset => "RELEASE_SERDES_RESET",
            BringupState::Align => "ALIGN",
            BringupState::WaitAlign => "WAIT_ALIGN",
            BringupState::WaitFirstAlignDone => "WAIT_FIRST_ALIGN_DONE",
            BringupState::WaitSecondAlignDone => "WAIT_SECOND_ALIGN_DONE",
            BringupState::Ready => "READY",
        }
    }
}

impl fmt::Display for BringupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Timing parameters of one lane's bring-up, in lane-clock cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BringupTiming {
    /// Minimum PLL reset hold.
    pub pll_reset_cycles: u64,
    /// Readiness watchdog window.
    pub watchdog_cycles: u64,
    /// CDR-stable wait; `Some` only on receive lanes.
    pub cdr_stable_cycles: Option<u64>,
    /// Synchronizer stages on every status input.
    pub sync_stages: usize,
}

/// Everything a lane's bring-up produced on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BringupStep {
    /// Control lines driven to the serializer during this tick.
    pub control: PhyControl,
    /// State change committed at the end of this tick, if any.
    pub transition: Option<(BringupState, BringupState)>,
    /// Whether the watchdog forced the restart committed this tick.
    pub watchdog_fired: bool,
}

/// One lane's bring-up controller.
#[derive(Debug, Clone)]
pub struct LaneBringup {
    state: BringupState,
    pll_lock: BitSync<bool>,
    reset_done: BitSync<bool>,
    delay_reset_done: BitSync<bool>,
    phase_align_done: BitSync<bool>,
    phase_align_prev: bool,
    pll_reset_timer: WaitTimer,
    cdr_stable_timer: Option<WaitTimer>,
    watchdog: WaitTimer,
    serdes_reset_q: bool,
    delay_reset_q: bool,
}

impl LaneBringup {
    /// Creates a lane controller in `RESET_ALL`.
    pub fn new(timing: BringupTiming) -> Self {
        let stages = timing.sync_stages;
        Self {
            state: BringupState::ResetAll,
            pll_lock: BitSync::new(stages, false),
            reset_done: BitSync::new(stages, false),
            delay_reset_done: BitSync::new(stages, false),
            phase_align_done: BitSync::new(stages, false),
            // A status already high at power-up is not an edge.
            phase_align_prev: true,
            pll_reset_timer: WaitTimer::new(timing.pll_reset_cycles),
            cdr_stable_timer: timing.cdr_stable_cycles.map(WaitTimer::new),
            watchdog: WaitTimer::new(timing.watchdog_cycles),
            serdes_reset_q: false,
            delay_reset_q: false,
        }
    }

    /// Enables metastability modeling on every status synchronizer.
    pub fn with_metastability(mut self, seed: u64) -> Self {
        self.pll_lock = self.pll_lock.with_metastability(seed);
        self.reset_done = self.reset_done.with_metastability(seed.wrapping_add(1));
        self.delay_reset_done = self.delay_reset_done.with_metastability(seed.wrapping_add(2));
        self.phase_align_done = self.phase_align_done.with_metastability(seed.wrapping_add(3));
        self
    }

    /// Current state.
    pub fn state(&self) -> BringupState {
        self.state
    }

    /// `true` while the lane is in `READY`.
    pub fn done(&self) -> bool {
        self.state == BringupState::Ready
    }

    /// Evaluates one lane-clock tick.
    ///
    /// `restart` is the already-synchronized restart request; `status` is the
    /// raw asynchronous serializer status, crossed here.
    pub fn tick(&mut self, restart: bool, status: PhyStatus) -> BringupStep {
        use BringupState::*;

        let pll_lock = self.pll_lock.observe(status.pll_lock);
        let reset_done = self.reset_done.observe(status.reset_done);
        let delay_reset_done = self.delay_reset_done.observe(status.delay_reset_done);
        let phase_align_done = self.phase_align_done.observe(status.phase_align_done);
        let phase_align_rising = phase_align_done && !self.phase_align_prev;

        let watchdog_expired = self.watchdog.done();
        let fsm_reset = restart || watchdog_expired;
        let cdr_stable = self.cdr_stable_timer.as_ref().map_or(true, WaitTimer::done);

        let state = self.state;
        let mut next = match state {
            ResetAll if self.pll_reset_timer.done() => ReleasePllReset,
            ReleasePllReset if pll_lock => ReleaseSerdesReset,
            ReleaseSerdesReset if reset_done && cdr_stable => Align,
            Align => WaitAlign,
            WaitAlign if delay_reset_done => WaitFirstAlignDone,
            WaitFirstAlignDone if phase_align_rising => WaitSecondAlignDone,
            WaitSecondAlignDone if phase_align_rising => Ready,
            other => other,
        };
        if fsm_reset {
            next = ResetAll;
        }

        let control = PhyControl {
            pll_reset: state == ResetAll,
            serdes_reset: self.serdes_reset_q,
            delay_reset: self.delay_reset_q,
        };

        self.serdes_reset_q = matches!(state, ResetAll | ReleasePllReset);
        self.delay_reset_q = state == Align;
        self.pll_reset_timer.arm(state == ResetAll);
        if let Some(timer) = self.cdr_stable_timer.as_mut() {
            timer.arm(state == ReleaseSerdesReset);
        }
        self.watchdog.arm(state != Ready && !fsm_reset);
        self.phase_align_prev = phase_align_done;
        self.state = next;

        BringupStep {
            control,
            transition: (next != state).then_some((state, next)),
            watchdog_fired: watchdog_expired && !restart,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BringupState::*;

    const TIMING: BringupTiming = BringupTiming {
        pll_reset_cycles: 10,
        watchdog_cycles: 200,
        cdr_stable_cycles: None,
        sync_stages: 2,
    };

    fn status(lock: bool, reset_done: bool, dly: bool, phase: bool) -> PhyStatus {
        PhyStatus {
            pll_lock: lock,
            reset_done,
            delay_reset_done: dly,
            phase_align_done: phase,
        }
    }

    /// Ticks until the lane reaches `target`, feeding a constant status.
    fn run_to(fsm: &mut LaneBringup, target: BringupState, st: PhyStatus, limit: usize) -> usize {
        for n in 0..limit {
            if fsm.state() == target {
                return n;
            }
            fsm.tick(false, st);
        }
        panic!("did not reach {target} within {limit} ticks (at {})", fsm.state());
    }

    /// Drives a lane all the way to READY with a cooperative serializer.
    fn bring_up(fsm: &mut LaneBringup) {
        let locked = status(true, true, true, false);
        run_to(fsm, WaitFirstAlignDone, locked, 100);
        let pattern = [true, true, false, false, true, true, true, true];
        for &p in &pattern {
            fsm.tick(false, status(true, true, true, p));
        }
        run_to(fsm, Ready, status(true, true, true, true), 10);
    }

    #[test]
    fn starts_in_reset_all() {
        let fsm = LaneBringup::new(TIMING);
        assert_eq!(fsm.state(), ResetAll);
        assert!(!fsm.done());
    }

    #[test]
    fn pll_reset_held_for_minimum() {
        let mut fsm = LaneBringup::new(TIMING);
        let mut held = 0;
        loop {
            let step = fsm.tick(false, status(true, false, false, false));
            assert!(step.control.pll_reset);
            held += 1;
            if fsm.state() != ResetAll {
                break;
            }
        }
        assert!(held >= TIMING.pll_reset_cycles as usize);
        assert_eq!(fsm.state(), ReleasePllReset);
    }

    #[test]
    fn waits_for_synchronized_lock() {
        let mut fsm = LaneBringup::new(TIMING);
        run_to(&mut fsm, ReleasePllReset, status(false, false, false, false), 50);
        for _ in 0..20 {
            let step = fsm.tick(false, status(false, false, false, false));
            assert!(!step.control.pll_reset);
            assert!(step.control.serdes_reset);
        }
        assert_eq!(fsm.state(), ReleasePllReset);
        // Lock needs the synchronizer latency before it is acted on.
        fsm.tick(false, status(true, false, false, false));
        fsm.tick(false, status(true, false, false, false));
        assert_eq!(fsm.state(), ReleasePllReset);
        fsm.tick(false, status(true, false, false, false));
        assert_eq!(fsm.state(), ReleaseSerdesReset);
    }

    #[test]
    fn align_pulse_is_exactly_one_tick() {
        let mut fsm = LaneBringup::new(TIMING);
        let st = status(true, true, false, false);
        let mut pulses = 0;
        for _ in 0..60 {
            if fsm.tick(false, st).control.delay_reset {
                pulses += 1;
            }
        }
        assert_eq!(fsm.state(), WaitAlign);
        assert_eq!(pulses, 1);
    }

    #[test]
    fn serdes_reset_released_after_lock() {
        let mut fsm = LaneBringup::new(TIMING);
        let st = status(true, false, false, false);
        run_to(&mut fsm, ReleaseSerdesReset, st, 50);
        // Registered output trails the state by one tick.
        assert!(fsm.tick(false, st).control.serdes_reset);
        assert!(!fsm.tick(false, st).control.serdes_reset);
    }

    #[test]
    fn sustained_high_is_one_edge() {
        let mut fsm = LaneBringup::new(TIMING);
        run_to(&mut fsm, WaitFirstAlignDone, status(true, true, true, false), 100);
        for _ in 0..150 {
            fsm.tick(false, status(true, true, true, true));
        }
        assert_eq!(fsm.state(), WaitSecondAlignDone);
    }

    #[test]
    fn high_at_power_up_is_not_an_edge() {
        let mut fsm = LaneBringup::new(TIMING);
        let always_high = status(true, true, true, true);
        run_to(&mut fsm, WaitFirstAlignDone, always_high, 100);
        for _ in 0..50 {
            fsm.tick(false, always_high);
        }
        assert_eq!(fsm.state(), WaitFirstAlignDone);
    }

    #[test]
    fn two_edges_reach_ready() {
        let mut fsm = LaneBringup::new(TIMING);
        bring_up(&mut fsm);
        assert!(fsm.done());
        for _ in 0..500 {
            fsm.tick(false, status(true, true, true, true));
        }
        assert!(fsm.done(), "READY is held without restart");
    }

    #[test]
    fn receive_lane_waits_for_cdr_timer() {
        let mut fsm = LaneBringup::new(BringupTiming {
            cdr_stable_cycles: Some(50),
            ..TIMING
        });
        let st = status(true, true, false, false);
        run_to(&mut fsm, ReleaseSerdesReset, st, 50);
        let waited = run_to(&mut fsm, Align, st, 100);
        assert!(waited >= 50, "left after {waited} ticks");
    }

    #[test]
    fn restart_from_every_state_returns_to_reset_all() {
        for target in BringupState::ALL {
            let mut fsm = LaneBringup::new(TIMING);
            if target == Ready {
                bring_up(&mut fsm);
            } else if target != ResetAll {
                let st = status(true, true, true, false);
                let mut reached = false;
                for _ in 0..100 {
                    if fsm.state() == target {
                        reached = true;
                        break;
                    }
                    fsm.tick(false, st);
                }
                if !reached {
                    // WAIT_SECOND_ALIGN_DONE needs one edge.
                    run_to(&mut fsm, WaitFirstAlignDone, st, 100);
                    fsm.tick(false, status(true, true, true, true));
                    fsm.tick(false, status(true, true, true, true));
                    fsm.tick(false, status(true, true, true, true));
                }
            }
            assert_eq!(fsm.state(), target);
            fsm.tick(true, status(true, true, true, true));
            assert_eq!(fsm.state(), ResetAll, "restart from {target}");
        }
    }

    #[test]
    fn restart_in_reset_all_is_a_no_op() {
        let mut fsm = LaneBringup::new(TIMING);
        for _ in 0..5 {
            let step = fsm.tick(true, status(false, false, false, false));
            assert_eq!(step.transition, None);
            assert!(!step.watchdog_fired);
        }
        assert_eq!(fsm.state(), ResetAll);
    }

    #[test]
    fn held_restart_never_leaves_reset_all() {
        let mut fsm = LaneBringup::new(TIMING);
        for _ in 0..1000 {
            fsm.tick(true, status(true, true, true, true));
            assert_eq!(fsm.state(), ResetAll);
        }
    }

    #[test]
    fn watchdog_fires_once_per_window() {
        let mut fsm = LaneBringup::new(TIMING);
        let never_locks = status(false, false, false, false);
        let mut fired_at = Vec::new();
        for tick in 0..1000 {
            if fsm.tick(false, never_locks).watchdog_fired {
                fired_at.push(tick);
                assert_eq!(fsm.state(), ResetAll);
            }
        }
        assert_eq!(fired_at.first(), Some(&200));
        for pair in fired_at.windows(2) {
            assert_eq!(pair[1] - pair[0], 201);
        }
        assert_eq!(fired_at.len(), 4);
    }

    #[test]
    fn watchdog_restart_abandons_alignment() {
        let mut fsm = LaneBringup::new(TIMING);
        let stalled = status(true, true, true, false);
        run_to(&mut fsm, WaitFirstAlignDone, stalled, 100);
        let mut fired = false;
        for _ in 0..300 {
            let step = fsm.tick(false, stalled);
            if step.watchdog_fired {
                fired = true;
                assert_eq!(
                    step.transition,
                    Some((WaitFirstAlignDone, ResetAll))
                );
                break;
            }
        }
        assert!(fired);
    }

    #[test]
    fn watchdog_idle_while_ready() {
        let mut fsm = LaneBringup::new(TIMING);
        bring_up(&mut fsm);
        for _ in 0..1000 {
            assert!(!fsm.tick(false, status(true, true, true, true)).watchdog_fired);
        }
        assert!(fsm.done());
    }
}
