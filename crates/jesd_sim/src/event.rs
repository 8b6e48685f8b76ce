//! Structured event log for link activity.
//!
//! The link never prints. Everything worth reporting (lane state changes,
//! watchdog restarts, restart broadcasts, aggregate status changes) is
//! recorded as a [`LinkEvent`] in the link's [`EventLog`], which front ends
//! render as text or JSON.

use std::fmt;

use jesd_common::{DomainId, LaneId, SimTime};
use serde::Serialize;

use crate::bringup::BringupState;

/// Importance of a [`LinkEvent`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine progress.
    Info,
    /// Something that indicates a problem but is retried automatically.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// What happened.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// A lane's bring-up machine changed state.
    LaneTransition {
        /// The lane.
        lane: LaneId,
        /// State before the edge.
        from: BringupState,
        /// State after the edge.
        to: BringupState,
    },
    /// A lane's readiness watchdog expired and restarted its bring-up.
    WatchdogRestart {
        /// The lane.
        lane: LaneId,
    },
    /// The restart broadcast changed because `enable` was written.
    RestartBroadcast {
        /// `true` when restart is now asserted.
        asserted: bool,
    },
    /// Aggregate `serdes_done` changed.
    SerdesDone {
        /// New level.
        level: bool,
    },
    /// Aggregate `ready` changed.
    Ready {
        /// New level.
        level: bool,
    },
    /// JSYNC as seen by the control domain changed.
    Jsync {
        /// New level.
        level: bool,
    },
}

impl EventKind {
    /// Default severity for this kind of event.
    pub fn severity(&self) -> Severity {
        match self {
            EventKind::WatchdogRestart { .. } => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::LaneTransition { lane, from, to } => write!(f, "{lane}: {from} -> {to}"),
            EventKind::WatchdogRestart { lane } => {
                write!(f, "{lane}: readiness watchdog expired, restarting bring-up")
            }
            EventKind::RestartBroadcast { asserted: true } => write!(f, "restart asserted"),
            EventKind::RestartBroadcast { asserted: false } => write!(f, "restart released"),
            EventKind::SerdesDone { level } => write!(f, "serdes_done = {}", u8::from(*level)),
            EventKind::Ready { level } => write!(f, "ready = {}", u8::from(*level)),
            EventKind::Jsync { level } => write!(f, "jsync = {}", u8::from(*level)),
        }
    }
}

/// One recorded event.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct LinkEvent {
    /// Simulation time of the edge that produced the event.
    pub time: SimTime,
    /// Domain whose edge produced the event.
    pub domain: DomainId,
    /// Importance.
    pub severity: Severity,
    /// What happened.
    #[serde(flatten)]
    pub kind: EventKind,
}

impl fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}] {}: {}", self.time, self.domain, self.severity, self.kind)
    }
}

/// Accumulates [`LinkEvent`]s in time order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<LinkEvent>,
    warning_count: usize,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event with its kind's default severity.
    pub fn emit(&mut self, time: SimTime, domain: DomainId, kind: EventKind) {
        let severity = kind.severity();
        if severity == Severity::Warning {
            self.warning_count += 1;
        }
        self.events.push(LinkEvent {
            time,
            domain,
            severity,
            kind,
        });
    }

    /// All events recorded since the last [`take_all`](Self::take_all).
    pub fn events(&self) -> &[LinkEvent] {
        &self.events
    }

    /// Number of warning events ever recorded.
    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    /// Takes all accumulated events, leaving the log empty.
    pub fn take_all(&mut self) -> Vec<LinkEvent> {
        std::mem::take(&mut self.events)
    }

    /// Time of the first event matching `pred`.
    pub fn first_time(&self, mut pred: impl FnMut(&EventKind) -> bool) -> Option<SimTime> {
        self.events.iter().find(|e| pred(&e.kind)).map(|e| e.time)
    }
}
