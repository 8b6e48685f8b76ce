//! Discrete-edge scheduler for independent clock domains.
//!
//! [`DomainScheduler`] holds one free-running clock per domain and hands out
//! edges in time order. Each clock's `k`-th rising edge falls at
//! `phase + k * period`, with the period rounded to whole femtoseconds.
//! Domains whose edges coincide are returned together so the caller can
//! evaluate them against a common snapshot.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use jesd_common::{DomainId, SimTime};
use jesd_config::ClockSpec;

#[derive(Debug, Clone)]
struct DomainClock {
    name: String,
    period_fs: u64,
    phase_fs: u64,
    edges: u64,
}

impl DomainClock {
    fn edge_time(&self, index: u64) -> u64 {
        self.phase_fs + index * self.period_fs
    }
}

/// Min-heap of pending clock edges, one per domain.
#[derive(Debug, Clone, Default)]
pub struct DomainScheduler {
    clocks: Vec<DomainClock>,
    queue: BinaryHeap<Reverse<(u64, DomainId)>>,
    now: SimTime,
}

impl DomainScheduler {
    /// Creates a scheduler with no domains.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a clock domain and returns its ID. IDs are allocated in
    /// registration order starting at 0.
    pub fn add_domain(&mut self, name: impl Into<String>, clock: ClockSpec) -> DomainId {
        let id = DomainId::from_raw(self.clocks.len() as u32);
        let period_fs = clock.frequency.period().fs.max(1);
        let domain = DomainClock {
            name: name.into(),
            period_fs,
            phase_fs: clock.phase.fs,
            edges: 0,
        };
        self.queue.push(Reverse((domain.edge_time(0), id)));
        self.clocks.push(domain);
        id
    }

    /// Number of registered domains.
    pub fn domain_count(&self) -> usize {
        self.clocks.len()
    }

    /// Name given to a domain at registration.
    pub fn name(&self, domain: DomainId) -> &str {
        &self.clocks[domain.index()].name
    }

    /// Clock period of a domain.
    pub fn period(&self, domain: DomainId) -> SimTime {
        SimTime::from_fs(self.clocks[domain.index()].period_fs)
    }

    /// Number of edges a domain has been handed so far.
    pub fn edges(&self, domain: DomainId) -> u64 {
        self.clocks[domain.index()].edges
    }

    /// Time of the most recently handed-out edge.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Time of the next pending edge.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue
            .peek()
            .map(|Reverse((fs, _))| SimTime::from_fs(*fs))
    }

    /// Pops every domain whose edge falls at the earliest pending instant,
    /// in ascending domain order, and schedules each one's following edge.
    pub fn next_edges(&mut self) -> Option<(SimTime, Vec<DomainId>)> {
        let Reverse((time, first)) = self.queue.pop()?;
        let mut due = vec![first];
        while let Some(&Reverse((t, id))) = self.queue.peek() {
            if t != time {
                break;
            }
            self.queue.pop();
            due.push(id);
        }
        for &id in &due {
            let clock = &mut self.clocks[id.index()];
            clock.edges += 1;
            self.queue.push(Reverse((clock.edge_time(clock.edges), id)));
        }
        self.now = SimTime::from_fs(time);
        Some((self.now, due))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jesd_common::Frequency;

    fn clock(mhz: f64, phase_ns: u64) -> ClockSpec {
        ClockSpec {
            frequency: Frequency::from_mhz(mhz),
            phase: SimTime::from_ns(phase_ns),
        }
    }

    #[test]
    fn ids_follow_registration_order() {
        let mut s = DomainScheduler::new();
        assert_eq!(s.add_domain("sys", clock(125.0, 0)), DomainId::from_raw(0));
        assert_eq!(s.add_domain("jesd", clock(250.0, 0)), DomainId::from_raw(1));
        assert_eq!(s.domain_count(), 2);
        assert_eq!(s.name(DomainId::from_raw(1)), "jesd");
        assert_eq!(s.period(DomainId::from_raw(0)), SimTime::from_ns(8));
    }

    #[test]
    fn coincident_edges_are_grouped() {
        let mut s = DomainScheduler::new();
        let sys = s.add_domain("sys", clock(125.0, 0));
        let jesd = s.add_domain("jesd", clock(250.0, 0));
        assert_eq!(s.next_edges(), Some((SimTime::ZERO, vec![sys, jesd])));
        assert_eq!(s.next_edges(), Some((SimTime::from_ns(4), vec![jesd])));
        assert_eq!(s.next_edges(), Some((SimTime::from_ns(8), vec![sys, jesd])));
        assert_eq!(s.edges(sys), 2);
        assert_eq!(s.edges(jesd), 3);
    }

    #[test]
    fn phase_offsets_interleave() {
        let mut s = DomainScheduler::new();
        let a = s.add_domain("lane0", clock(250.0, 0));
        let b = s.add_domain("lane1", clock(250.0, 1));
        let order: Vec<(u64, DomainId)> = (0..4)
            .map(|_| {
                let (t, due) = s.next_edges().unwrap();
                (t.to_ns(), due[0])
            })
            .collect();
        assert_eq!(order, vec![(0, a), (1, b), (4, a), (5, b)]);
    }

    #[test]
    fn empty_scheduler_has_no_edges() {
        let mut s = DomainScheduler::new();
        assert_eq!(s.peek_time(), None);
        assert_eq!(s.next_edges(), None);
    }
}
