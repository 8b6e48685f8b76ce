//! Link assembly and the multi-domain link controller.
//!
//! A [`Link`] is assembled once by a [`LinkBuilder`] with a fixed lane count
//! and then only driven. It owns three kinds of clock domain:
//!
//! - the **control** domain holds the externally written registers (`enable`,
//!   test pattern select, STPL enable) and the aggregate status;
//! - the **device** domain runs the payload sources, the STPL mux, and every
//!   lane's link-layer encoder, and writes each lane's boundary buffer;
//! - one **lane** domain per lane runs that lane's bring-up machine, reads its
//!   boundary buffer, and clocks its serializer.
//!
//! All edges falling on the same instant are evaluated against one snapshot of
//! the published cross-domain values, taken before any of them commits. Every
//! cross-domain value then goes through a synchronizer owned by the reading
//! domain.

use jesd_common::{DomainId, LaneId, SignalId, SimTime};
use jesd_config::{ConfigCrossing, JsyncKind, ResolvedLink};

use crate::aggregate::{LinkStatus, ReadinessAggregator};
use crate::bringup::{BringupState, BringupTiming, LaneBringup};
use crate::cdc::{BitSync, BusSync, MIN_SYNC_STAGES};
use crate::ebuf::BoundaryBuffer;
use crate::error::LinkError;
use crate::event::{EventKind, EventLog, LinkEvent};
use crate::kernel::DomainScheduler;
use crate::link_layer::{LinkInputs, LinkLayer, SyncHandshake};
use crate::phy::{GtxModel, PhyControl, SerdesPhy};
use crate::transport::{LaneWord, PayloadSource, RampSource, StplGenerator};
use crate::waveform::WaveformRecorder;

/// The control domain's ID in every link.
pub const CONTROL_DOMAIN: DomainId = DomainId::from_raw(0);
/// The device domain's ID in every link.
pub const DEVICE_DOMAIN: DomainId = DomainId::from_raw(1);

const FIRST_LANE_DOMAIN: u32 = 2;
const TEST_PATTERN_WIDTH: u32 = 4;

/// Returns the clock domain of lane `lane`.
pub fn lane_domain(lane: usize) -> DomainId {
    DomainId::from_raw(FIRST_LANE_DOMAIN + lane as u32)
}

/// A level driven onto the JSYNC input, in the shape it was registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsyncLevel {
    /// Single-ended logic level.
    Signal(bool),
    /// Differential pair.
    Differential {
        /// Positive leg.
        p: bool,
        /// Negative leg.
        n: bool,
    },
}

impl JsyncLevel {
    /// The level of the given shape that decodes to `level`.
    pub fn for_kind(kind: JsyncKind, level: bool) -> Self {
        match kind {
            JsyncKind::Signal => JsyncLevel::Signal(level),
            JsyncKind::Differential => JsyncLevel::Differential { p: level, n: !level },
        }
    }

    fn shape(self) -> &'static str {
        match self {
            JsyncLevel::Signal(_) => "signal",
            JsyncLevel::Differential { .. } => "differential",
        }
    }
}

fn kind_shape(kind: JsyncKind) -> &'static str {
    match kind {
        JsyncKind::Signal => "signal",
        JsyncKind::Differential => "differential",
    }
}

/// The registered JSYNC input and its decoded level.
#[derive(Debug, Clone, Copy)]
struct JsyncLine {
    kind: JsyncKind,
    level: bool,
}

impl JsyncLine {
    fn drive(&mut self, level: JsyncLevel) -> Result<(), LinkError> {
        match (self.kind, level) {
            (JsyncKind::Signal, JsyncLevel::Signal(v)) => self.level = v,
            // A non-complementary pair leaves the receiver output unchanged.
            (JsyncKind::Differential, JsyncLevel::Differential { p, n }) => {
                if p != n {
                    self.level = p;
                }
            }
            (kind, level) => {
                return Err(LinkError::JsyncShapeMismatch {
                    registered: kind_shape(kind),
                    driven: level.shape(),
                })
            }
        }
        Ok(())
    }
}

/// Hands out synchronizers, each with its own metastability seed if enabled.
struct SyncFactory {
    stages: usize,
    crossing: ConfigCrossing,
    seed: Option<u64>,
    issued: u64,
}

impl SyncFactory {
    fn next_seed(&mut self) -> Option<u64> {
        let base = self.seed?;
        self.issued += 1;
        // Bus synchronizers derive one seed per bit from this; keep them apart.
        Some(base.wrapping_add(self.issued.wrapping_mul(64)))
    }

    fn bit<T: Copy + PartialEq>(&mut self, init: T) -> BitSync<T> {
        let sync = BitSync::new(self.stages, init);
        match self.next_seed() {
            Some(seed) => sync.with_metastability(seed),
            None => sync,
        }
    }

    fn bus(&mut self, width: u32, init: u32) -> BusSync {
        let sync = BusSync::new(width, self.stages, self.crossing, init);
        match self.next_seed() {
            Some(seed) => sync.with_metastability(seed),
            None => sync,
        }
    }
}

/// One lane: its clock domain, bring-up machine, boundary buffer, and serializer.
pub struct Lane {
    id: LaneId,
    domain: DomainId,
    fsm: LaneBringup,
    buffer: BoundaryBuffer<LaneWord>,
    phy: Box<dyn SerdesPhy>,
    restart: BitSync<bool>,
    test_pattern: BusSync,
    control: PhyControl,
    done: bool,
    watchdog_restarts: u64,
}

impl Lane {
    /// Lane index.
    pub fn id(&self) -> LaneId {
        self.id
    }

    /// Clock domain the lane runs in.
    pub fn domain(&self) -> DomainId {
        self.domain
    }

    /// Current bring-up state.
    pub fn state(&self) -> BringupState {
        self.fsm.state()
    }

    /// Last published `done` bit.
    pub fn done(&self) -> bool {
        self.done
    }

    /// Control lines driven to the serializer on the last lane tick.
    pub fn control(&self) -> PhyControl {
        self.control
    }

    /// The lane's serializer.
    pub fn phy(&self) -> &dyn SerdesPhy {
        self.phy.as_ref()
    }

    /// Number of times the readiness watchdog restarted this lane.
    pub fn watchdog_restarts(&self) -> u64 {
        self.watchdog_restarts
    }

    /// Write-to-read pointer distance of the lane's boundary buffer.
    pub fn buffer_distance(&self) -> usize {
        self.buffer.pointer_distance()
    }
}

/// Assembles a [`Link`] from resolved settings and optional collaborators.
///
/// JSYNC and JREF must be registered before [`build`](Self::build); anything
/// else not supplied gets the behavioral model built from the settings.
pub struct LinkBuilder {
    settings: ResolvedLink,
    jsync: Option<JsyncKind>,
    jref: bool,
    phys: Option<Vec<Box<dyn SerdesPhy>>>,
    link_layers: Option<Vec<Box<dyn LinkLayer>>>,
    payload: Option<Box<dyn PayloadSource>>,
}

impl LinkBuilder {
    /// Starts a link with nothing wired.
    pub fn new(settings: ResolvedLink) -> Self {
        Self {
            settings,
            jsync: None,
            jref: false,
            phys: None,
            link_layers: None,
            payload: None,
        }
    }

    /// Starts a link wired as the settings' `[wiring]` table describes.
    pub fn from_settings(settings: ResolvedLink) -> Self {
        let jsync = settings.jsync;
        let jref = settings.jref;
        Self {
            jsync,
            jref,
            ..Self::new(settings)
        }
    }

    /// Registers the asynchronous JSYNC input with the given shape.
    pub fn register_jsync(mut self, kind: JsyncKind) -> Self {
        self.jsync = Some(kind);
        self
    }

    /// Registers the device-synchronous JREF input.
    pub fn register_jref(mut self) -> Self {
        self.jref = true;
        self
    }

    /// Supplies one serializer per lane.
    pub fn with_phys(mut self, phys: Vec<Box<dyn SerdesPhy>>) -> Self {
        self.phys = Some(phys);
        self
    }

    /// Supplies one link-layer encoder per lane.
    pub fn with_link_layers(mut self, link_layers: Vec<Box<dyn LinkLayer>>) -> Self {
        self.link_layers = Some(link_layers);
        self
    }

    /// Supplies the live transport payload source.
    pub fn with_payload_source(mut self, source: Box<dyn PayloadSource>) -> Self {
        self.payload = Some(source);
        self
    }

    /// Validates the assembly and finalizes the link.
    pub fn build(self) -> Result<Link, LinkError> {
        let s = self.settings;
        if s.lanes == 0 {
            return Err(LinkError::NoLanes);
        }
        if s.sync_stages < MIN_SYNC_STAGES {
            return Err(LinkError::TooFewSyncStages(s.sync_stages));
        }
        if s.buffer_depth < 2 || !s.buffer_depth.is_power_of_two() {
            return Err(LinkError::InvalidBufferDepth(s.buffer_depth));
        }
        expect_lanes("lane clocks", s.lanes, s.lane_clocks.len())?;
        let jsync_kind = self.jsync.ok_or(LinkError::MissingWiring("JSYNC"))?;
        if !self.jref {
            return Err(LinkError::MissingWiring("JREF"));
        }

        let phys = match self.phys {
            Some(phys) => {
                expect_lanes("serializers", s.lanes, phys.len())?;
                phys
            }
            None => (0..s.lanes)
                .map(|i| {
                    let model = GtxModel::new(&s.phy, s.seed.wrapping_add(i as u64));
                    let model = if s.stuck_lanes.contains(&i) {
                        model.stuck()
                    } else {
                        model
                    };
                    Box::new(model) as Box<dyn SerdesPhy>
                })
                .collect(),
        };
        let link_layers = match self.link_layers {
            Some(links) => {
                expect_lanes("link-layer encoders", s.lanes, links.len())?;
                links
            }
            None => (0..s.lanes)
                .map(|_| {
                    Box::new(SyncHandshake::new(s.multiframe_cycles, s.ilas_cycles))
                        as Box<dyn LinkLayer>
                })
                .collect(),
        };
        let payload = self
            .payload
            .unwrap_or_else(|| Box::new(RampSource::new(s.lanes)));

        let mut syncs = SyncFactory {
            stages: s.sync_stages,
            crossing: s.config_crossing,
            seed: s.metastability.then_some(s.seed),
            issued: 0,
        };

        let mut scheduler = DomainScheduler::new();
        let control_id = scheduler.add_domain("sys", s.sys_clock);
        let device_id = scheduler.add_domain("jesd", s.jesd_clock);
        debug_assert_eq!((control_id, device_id), (CONTROL_DOMAIN, DEVICE_DOMAIN));

        let timing = BringupTiming {
            pll_reset_cycles: s.pll_reset_cycles,
            watchdog_cycles: s.watchdog_cycles,
            cdr_stable_cycles: s.cdr_stable_cycles,
            sync_stages: s.sync_stages,
        };
        let mut lanes = Vec::with_capacity(s.lanes);
        for (i, (clock, phy)) in s.lane_clocks.iter().zip(phys).enumerate() {
            let domain = scheduler.add_domain(format!("lane{i}"), *clock);
            let mut fsm = LaneBringup::new(timing);
            if let Some(seed) = syncs.next_seed() {
                fsm = fsm.with_metastability(seed);
            }
            lanes.push(Lane {
                id: LaneId::from_raw(i as u32),
                domain,
                fsm,
                buffer: BoundaryBuffer::new(s.buffer_depth, s.sync_stages, LaneWord::default())?,
                phy,
                // Enable is low at power-up, so restart starts asserted.
                restart: syncs.bit(true),
                test_pattern: syncs.bus(TEST_PATTERN_WIDTH, 0),
                control: PhyControl::default(),
                done: false,
                watchdog_restarts: 0,
            });
        }

        Ok(Link {
            name: s.name,
            scheduler,
            now: SimTime::ZERO,
            enable: false,
            test_pattern: 0,
            stpl_enable: false,
            jsync: JsyncLine {
                kind: jsync_kind,
                level: false,
            },
            jref: false,
            control: ControlDomain {
                aggregator: ReadinessAggregator::new(syncs.bit(false), syncs.bit(false)),
                jsync: syncs.bit(false),
                status: LinkStatus::default(),
            },
            device: DeviceDomain {
                link_layers,
                payload,
                stpl: StplGenerator,
                serdes_done: syncs.bit(false),
                jsync: syncs.bit(false),
                stpl_enable: syncs.bit(false),
            },
            lanes,
            events: EventLog::new(),
            trace: None,
        })
    }
}

fn expect_lanes(what: &'static str, expected: usize, got: usize) -> Result<(), LinkError> {
    if expected == got {
        Ok(())
    } else {
        Err(LinkError::LaneCountMismatch {
            what,
            expected,
            got,
        })
    }
}

struct ControlDomain {
    aggregator: ReadinessAggregator,
    jsync: BitSync<bool>,
    status: LinkStatus,
}

struct DeviceDomain {
    link_layers: Vec<Box<dyn LinkLayer>>,
    payload: Box<dyn PayloadSource>,
    stpl: StplGenerator,
    serdes_done: BitSync<bool>,
    jsync: BitSync<bool>,
    stpl_enable: BitSync<bool>,
}

/// Values other domains may read, frozen before an instant's edges commit.
struct Snapshot {
    enable: bool,
    test_pattern: u8,
    stpl_enable: bool,
    jsync: bool,
    jref: bool,
    lane_done: Vec<bool>,
    link_ready: Vec<bool>,
}

struct Trace {
    recorder: Box<dyn WaveformRecorder>,
    last: Vec<Option<u64>>,
}

/// Signals traced per lane, with their widths.
const LANE_SIGNALS: [(&str, u32); 5] = [
    ("state", 3),
    ("done", 1),
    ("pll_reset", 1),
    ("serdes_reset", 1),
    ("delay_reset", 1),
];
/// Signals traced in the control scope, with their widths.
const CONTROL_SIGNALS: [(&str, u32); 4] = [("enable", 1), ("ready", 1), ("serdes_done", 1), ("jsync", 1)];

/// A finalized multi-lane link.
pub struct Link {
    name: String,
    scheduler: DomainScheduler,
    now: SimTime,
    enable: bool,
    test_pattern: u8,
    stpl_enable: bool,
    jsync: JsyncLine,
    jref: bool,
    control: ControlDomain,
    device: DeviceDomain,
    lanes: Vec<Lane>,
    events: EventLog,
    trace: Option<Trace>,
}

impl Link {
    /// Link name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current simulation time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Number of lanes.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// All lanes in index order.
    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    /// Lane `lane`, if it exists.
    pub fn lane(&self, lane: usize) -> Option<&Lane> {
        self.lanes.get(lane)
    }

    /// Bring-up state of lane `lane`, if it exists.
    pub fn lane_state(&self, lane: usize) -> Option<BringupState> {
        self.lanes.get(lane).map(Lane::state)
    }

    /// Whether lane `lane`'s link-layer encoder is passing payload.
    pub fn link_layer_ready(&self, lane: usize) -> bool {
        self.device
            .link_layers
            .get(lane)
            .is_some_and(|link| link.ready())
    }

    /// Aggregate status as registered in the control domain.
    pub fn status(&self) -> LinkStatus {
        self.control.status
    }

    /// Number of edges a domain has taken.
    pub fn ticks(&self, domain: DomainId) -> u64 {
        self.scheduler.edges(domain)
    }

    /// Clock period of a domain.
    pub fn period(&self, domain: DomainId) -> SimTime {
        self.scheduler.period(domain)
    }

    /// The event log.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Drains the event log.
    pub fn take_events(&mut self) -> Vec<LinkEvent> {
        self.events.take_all()
    }

    /// Current `enable` register.
    pub fn enabled(&self) -> bool {
        self.enable
    }

    /// Writes the `enable` register. Clearing it asserts restart on every lane.
    pub fn set_enable(&mut self, enable: bool) {
        if enable != self.enable {
            self.events.emit(
                self.now,
                CONTROL_DOMAIN,
                EventKind::RestartBroadcast { asserted: !enable },
            );
        }
        self.enable = enable;
    }

    /// Writes the 4-bit test pattern select broadcast to every serializer.
    pub fn set_test_pattern(&mut self, select: u8) {
        self.test_pattern = select & 0xF;
    }

    /// Selects the built-in short test pattern over the live payload.
    pub fn set_stpl_enable(&mut self, enable: bool) {
        self.stpl_enable = enable;
    }

    /// Drives the JSYNC input. The level must have the registered shape.
    pub fn drive_jsync(&mut self, level: JsyncLevel) -> Result<(), LinkError> {
        self.jsync.drive(level)
    }

    /// Drives the JREF input, sampled by the device domain.
    pub fn drive_jref(&mut self, level: bool) {
        self.jref = level;
    }

    /// Advances to the next edge instant and evaluates every domain due then.
    pub fn step(&mut self) -> Result<(), LinkError> {
        let Some((time, due)) = self.scheduler.next_edges() else {
            return Ok(());
        };
        self.now = time;
        let snapshot = self.snapshot();
        for domain in due {
            match domain {
                CONTROL_DOMAIN => self.tick_control(&snapshot),
                DEVICE_DOMAIN => self.tick_device(&snapshot),
                lane => self.tick_lane((lane.as_raw() - FIRST_LANE_DOMAIN) as usize, &snapshot),
            }
        }
        self.record_waveform()
    }

    /// Runs every edge up to and including `now + duration`.
    pub fn run_for(&mut self, duration: SimTime) -> Result<(), LinkError> {
        let end = self.now + duration;
        while self.scheduler.peek_time().is_some_and(|t| t <= end) {
            self.step()?;
        }
        self.now = end;
        Ok(())
    }

    /// Runs until `done` holds, checking it before every edge instant.
    ///
    /// Returns `false` if `limit` elapsed first.
    pub fn run_until(
        &mut self,
        mut done: impl FnMut(&Link) -> bool,
        limit: SimTime,
    ) -> Result<bool, LinkError> {
        let end = self.now + limit;
        loop {
            if done(self) {
                return Ok(true);
            }
            match self.scheduler.peek_time() {
                Some(t) if t <= end => self.step()?,
                _ => {
                    self.now = end;
                    return Ok(false);
                }
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            enable: self.enable,
            test_pattern: self.test_pattern,
            stpl_enable: self.stpl_enable,
            jsync: self.jsync.level,
            jref: self.jref,
            lane_done: self.lanes.iter().map(Lane::done).collect(),
            link_ready: self.device.link_layers.iter().map(|l| l.ready()).collect(),
        }
    }

    fn tick_control(&mut self, snap: &Snapshot) {
        let (ready, serdes_done) = self
            .control
            .aggregator
            .tick(&snap.lane_done, &snap.link_ready);
        self.control.jsync.observe(snap.jsync);
        let status = LinkStatus {
            ready,
            serdes_done,
            jsync: self.control.jsync.value(),
        };
        let old = self.control.status;
        if status.serdes_done != old.serdes_done {
            self.events.emit(self.now, CONTROL_DOMAIN, EventKind::SerdesDone { level: serdes_done });
        }
        if status.ready != old.ready {
            self.events.emit(self.now, CONTROL_DOMAIN, EventKind::Ready { level: ready });
        }
        if status.jsync != old.jsync {
            self.events.emit(self.now, CONTROL_DOMAIN, EventKind::Jsync { level: status.jsync });
        }
        self.control.status = status;
    }

    fn tick_device(&mut self, snap: &Snapshot) {
        let device = &mut self.device;
        let serdes_done = device.serdes_done.observe(snap.lane_done.iter().all(|&d| d));
        let jsync = device.jsync.observe(snap.jsync);
        let stpl = device.stpl_enable.observe(snap.stpl_enable);
        // Encoders stay in reset until every serializer is up.
        let inputs = LinkInputs {
            reset: !serdes_done,
            jsync,
            jref: snap.jref,
        };
        for (i, lane) in self.lanes.iter_mut().enumerate() {
            let live = device.payload.next_word(i);
            let payload = if stpl { device.stpl.next_word(i) } else { live };
            let word = device.link_layers[i].tick(inputs, payload);
            lane.buffer.push(snap.enable, word);
        }
    }

    fn tick_lane(&mut self, index: usize, snap: &Snapshot) {
        let lane = &mut self.lanes[index];
        let restart = lane.restart.observe(!snap.enable);
        let pattern = lane.test_pattern.observe(u32::from(snap.test_pattern)) as u8;
        let step = lane.fsm.tick(restart, lane.phy.status());
        let word = lane.buffer.pop(snap.enable).unwrap_or_default();
        lane.phy.tick(step.control, pattern, word);
        lane.control = step.control;
        lane.done = lane.fsm.done();

        if step.watchdog_fired {
            lane.watchdog_restarts += 1;
            self.events
                .emit(self.now, lane.domain, EventKind::WatchdogRestart { lane: lane.id });
        }
        if let Some((from, to)) = step.transition {
            self.events.emit(
                self.now,
                lane.domain,
                EventKind::LaneTransition {
                    lane: lane.id,
                    from,
                    to,
                },
            );
        }
    }

    /// Attaches a waveform recorder, declaring every traced signal and
    /// dumping their current values.
    pub fn attach_recorder(
        &mut self,
        mut recorder: Box<dyn WaveformRecorder>,
    ) -> Result<(), LinkError> {
        let mut next = 0u32;
        recorder.begin_scope(&self.name)?;
        for (name, width) in CONTROL_SIGNALS {
            recorder.register_signal(SignalId::from_raw(next), name, width)?;
            next += 1;
        }
        for lane in &self.lanes {
            recorder.begin_scope(&lane.id.to_string())?;
            for (name, width) in LANE_SIGNALS {
                recorder.register_signal(SignalId::from_raw(next), name, width)?;
                next += 1;
            }
            recorder.end_scope()?;
        }
        recorder.end_scope()?;

        let count = next as usize;
        self.trace = Some(Trace {
            recorder,
            last: vec![None; count],
        });
        self.record_waveform()
    }

    /// Finalizes and detaches the waveform recorder, if one is attached.
    pub fn finish_waveform(&mut self) -> Result<(), LinkError> {
        match self.trace.take() {
            Some(mut trace) => trace.recorder.finalize(),
            None => Ok(()),
        }
    }

    fn signal_values(&self) -> Vec<u64> {
        let status = self.control.status;
        let mut values = vec![
            u64::from(self.enable),
            u64::from(status.ready),
            u64::from(status.serdes_done),
            u64::from(status.jsync),
        ];
        for lane in &self.lanes {
            values.extend([
                lane.state().code(),
                u64::from(lane.done),
                u64::from(lane.control.pll_reset),
                u64::from(lane.control.serdes_reset),
                u64::from(lane.control.delay_reset),
            ]);
        }
        values
    }

    fn record_waveform(&mut self) -> Result<(), LinkError> {
        if self.trace.is_none() {
            return Ok(());
        }
        let values = self.signal_values();
        let now = self.now;
        if let Some(trace) = self.trace.as_mut() {
            for (i, value) in values.into_iter().enumerate() {
                if trace.last[i] != Some(value) {
                    let id = SignalId::from_raw(i as u32);
                    trace.recorder.record_change(now, id, value)?;
                    trace.last[i] = Some(value);
                }
            }
        }
        Ok(())
    }
}
