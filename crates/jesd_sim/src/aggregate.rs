//! Readiness aggregation across lanes.

use serde::Serialize;

use crate::cdc::BitSync;

/// Aggregate link status, resident in the control domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    /// Every lane is up and every link-layer encoder is passing payload.
    pub ready: bool,
    /// Every lane's serializer bring-up has completed.
    pub serdes_done: bool,
    /// The JSYNC line as seen from the control domain.
    pub jsync: bool,
}

/// ANDs per-lane outcomes and crosses the results into the control domain.
///
/// The inputs are each lane's most recently published values; the only state
/// is the two synchronizers.
#[derive(Debug, Clone)]
pub struct ReadinessAggregator {
    ready: BitSync<bool>,
    serdes_done: BitSync<bool>,
}

impl ReadinessAggregator {
    /// Creates an aggregator from its two output synchronizers.
    pub fn new(ready: BitSync<bool>, serdes_done: BitSync<bool>) -> Self {
        Self { ready, serdes_done }
    }

    /// Control-domain tick. Returns `(ready, serdes_done)` as registered
    /// after this edge.
    pub fn tick(&mut self, lane_done: &[bool], link_ready: &[bool]) -> (bool, bool) {
        let all_done = lane_done.iter().all(|&d| d);
        let all_linked = link_ready.iter().all(|&r| r);
        self.ready.observe(all_done && all_linked);
        self.serdes_done.observe(all_done);
        (self.ready.value(), self.serdes_done.value())
    }
}
