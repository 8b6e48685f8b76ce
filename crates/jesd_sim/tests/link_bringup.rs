//! Link-level bring-up scenarios across all clock domains.

use std::fs;
use std::io::BufWriter;

use jesd_common::SimTime;
use jesd_config::{
    load_config_from_str, resolve_link, ConfigError, JsyncKind, ResolvedLink, MIN_PLL_RESET,
};
use jesd_sim::{
    lane_domain, BringupState, EventKind, GtxModel, JsyncLevel, LaneWord, Link, LinkBuilder,
    RampSource, SerdesPhy, StplGenerator, VcdRecorder, CONTROL_DOMAIN,
};

fn settings(lanes: u32, extra: &str) -> ResolvedLink {
    let toml = format!(
        r#"
[link]
name = "it"
lanes = {lanes}
seed = 11

[wiring]
jsync = {{ kind = "signal" }}
jref = true

[phy]
pll_lock = "200ns"
reset_done = "40ns"
delay_align_done = "20ns"
phase_align_first = "40ns"
phase_align_gap = "20ns"
phase_align_second = "40ns"
{extra}
"#
    );
    resolve_link(&load_config_from_str(&toml).unwrap()).unwrap()
}

fn link(lanes: u32) -> Link {
    LinkBuilder::from_settings(settings(lanes, "")).build().unwrap()
}

fn start(link: &mut Link) {
    link.drive_jsync(JsyncLevel::Signal(true)).unwrap();
    link.set_enable(true);
}

fn lane_ready_time(link: &Link, index: usize) -> Option<SimTime> {
    link.events().first_time(|k| {
        matches!(k, EventKind::LaneTransition { lane, to: BringupState::Ready, .. } if lane.index() == index)
    })
}

fn run_until_ready(link: &mut Link) {
    let up = link
        .run_until(|l| l.status().ready, SimTime::from_us(100))
        .unwrap();
    assert!(up, "link never became ready");
}

#[test]
fn staggered_lanes_ready_only_after_the_last() {
    let s = settings(3, "");
    let phys: Vec<Box<dyn SerdesPhy>> = (0..3)
        .map(|i| {
            let mut timing = s.phy.clone();
            if i == 2 {
                timing.pll_lock_cycles += 200;
            }
            Box::new(GtxModel::new(&timing, i)) as Box<dyn SerdesPhy>
        })
        .collect();
    let mut link = LinkBuilder::from_settings(s).with_phys(phys).build().unwrap();
    start(&mut link);

    // Whenever the aggregate is ready, every lane is.
    let limit = link.now() + SimTime::from_us(100);
    while !link.status().ready && link.now() < limit {
        link.step().unwrap();
        if link.status().serdes_done {
            assert!(link.lanes().iter().all(|l| l.done()));
        }
    }
    assert!(link.status().ready);
    assert!(link.lanes().iter().all(|l| l.done()));

    let t0 = lane_ready_time(&link, 0).unwrap();
    let t1 = lane_ready_time(&link, 1).unwrap();
    let t2 = lane_ready_time(&link, 2).unwrap();
    assert_eq!(t0, t1);
    assert!(t2 > t1);

    let serdes_done = link
        .events()
        .first_time(|k| matches!(k, EventKind::SerdesDone { level: true }))
        .unwrap();
    let ready = link
        .events()
        .first_time(|k| matches!(k, EventKind::Ready { level: true }))
        .unwrap();
    let sys = link.period(CONTROL_DOMAIN);
    assert!(serdes_done > t2);
    assert!(serdes_done <= t2 + sys * 3, "serdes_done lagged {}", serdes_done - t2);
    assert!(ready >= serdes_done);
}

#[test]
fn pll_reset_is_held_for_at_least_two_microseconds() {
    let mut link = link(2);
    start(&mut link);
    run_until_ready(&mut link);
    for index in 0..2 {
        let released = link
            .events()
            .first_time(|k| {
                matches!(k, EventKind::LaneTransition { lane, to: BringupState::ReleasePllReset, .. } if lane.index() == index)
            })
            .unwrap();
        assert!(released >= MIN_PLL_RESET, "lane{index} released PLL reset at {released}");
    }

    let config = load_config_from_str(
        "[link]\nname = \"it\"\nlanes = 1\n[timing]\npll_reset = \"10ns\"\n",
    )
    .unwrap();
    assert!(matches!(
        resolve_link(&config),
        Err(ConfigError::InvalidValue { field, .. }) if field == "timing.pll_reset"
    ));
}

#[test]
fn disable_resets_every_lane_from_any_state() {
    for target in BringupState::ALL {
        let mut link = link(2);
        start(&mut link);
        let reached = link
            .run_until(|l| l.lane_state(0) == Some(target), SimTime::from_us(20))
            .unwrap();
        assert!(reached, "never reached {target}");

        let before = link.ticks(lane_domain(0));
        link.set_enable(false);
        let reset = link
            .run_until(
                |l| l.lanes().iter().all(|lane| lane.state() == BringupState::ResetAll),
                SimTime::from_us(1),
            )
            .unwrap();
        assert!(reset, "lanes left running after disable in {target}");
        // Two synchronizer stages plus the committing edge.
        assert!(link.ticks(lane_domain(0)) - before <= 3, "slow restart from {target}");
    }
}

#[test]
fn rapid_enable_toggle_never_reaches_ready() {
    let mut link = link(2);
    link.drive_jsync(JsyncLevel::Signal(true)).unwrap();
    for _ in 0..20 {
        link.set_enable(true);
        link.run_for(SimTime::from_ns(12)).unwrap();
        link.set_enable(false);
        link.run_for(SimTime::from_ns(40)).unwrap();
    }
    assert!(lane_ready_time(&link, 0).is_none());
    assert!(lane_ready_time(&link, 1).is_none());
    assert!(!link.status().ready);
    // Both buffer sides are parked in their reset positions.
    for lane in link.lanes() {
        assert_eq!(lane.state(), BringupState::ResetAll);
        assert_eq!(lane.buffer_distance(), 2);
    }

    // A clean enable afterwards delivers an intact, ordered payload stream.
    link.set_enable(true);
    run_until_ready(&mut link);
    link.run_for(SimTime::from_us(1)).unwrap();
    for (i, lane) in link.lanes().iter().enumerate() {
        let words = lane.phy().recent_words();
        assert_eq!(words.len(), 64);
        for pair in words.windows(2) {
            assert_eq!(pair[0].ctrl, 0);
            assert_eq!(RampSource::lane_of(pair[0].data), i);
            assert_eq!(pair[1].data, pair[0].data + 1);
        }
    }
}

#[test]
fn watchdog_restarts_a_stuck_lane_once_per_window() {
    let mut s = settings(2, "");
    s.stuck_lanes = vec![1];
    s.watchdog_cycles = 2000;
    let mut link = LinkBuilder::from_settings(s).build().unwrap();
    start(&mut link);
    link.run_for(SimTime::from_us(40)).unwrap();

    let stuck = &link.lanes()[1];
    assert!(stuck.watchdog_restarts() >= 3);
    assert_eq!(link.lanes()[0].watchdog_restarts(), 0);
    assert_eq!(link.lane_state(0), Some(BringupState::Ready));
    assert!(!link.status().serdes_done);
    assert!(!link.status().ready);
    assert_eq!(link.events().warning_count() as u64, stuck.watchdog_restarts());

    let window = link.period(lane_domain(1)) * 2001;
    let restarts: Vec<SimTime> = link
        .events()
        .events()
        .iter()
        .filter(|e| matches!(e.kind, EventKind::WatchdogRestart { .. }))
        .map(|e| e.time)
        .collect();
    for pair in restarts.windows(2) {
        assert_eq!(pair[1] - pair[0], window);
    }
}

#[test]
fn receive_lanes_wait_for_cdr() {
    let mut tx = link(1);
    start(&mut tx);
    run_until_ready(&mut tx);

    // What `direction = "rx"` resolves to.
    let mut s = settings(1, "");
    s.cdr_stable_cycles = Some(500);
    let mut rx = LinkBuilder::from_settings(s).build().unwrap();
    start(&mut rx);
    run_until_ready(&mut rx);

    let lane_period = tx.period(lane_domain(0));
    let delay = lane_ready_time(&rx, 0).unwrap() - lane_ready_time(&tx, 0).unwrap();
    assert!(delay >= lane_period * 480, "rx lane only {delay} behind");
}

#[test]
fn stpl_replaces_live_payload() {
    let mut link = link(2);
    link.set_stpl_enable(true);
    start(&mut link);
    run_until_ready(&mut link);
    link.run_for(SimTime::from_us(1)).unwrap();
    for (i, lane) in link.lanes().iter().enumerate() {
        let last = *lane.phy().recent_words().last().unwrap();
        assert_eq!(last, LaneWord::data(StplGenerator::word(i)));
    }
}

#[test]
fn prbs_select_reaches_every_serializer() {
    let mut link = link(2);
    link.set_test_pattern(1);
    start(&mut link);
    let up = link
        .run_until(|l| l.status().serdes_done, SimTime::from_us(50))
        .unwrap();
    assert!(up);
    link.run_for(SimTime::from_us(1)).unwrap();
    for lane in link.lanes() {
        let bits: Vec<bool> = lane
            .phy()
            .recent_words()
            .iter()
            .flat_map(|w| (0..32).map(move |i| (w.data >> i) & 1 == 1))
            .collect();
        assert!(bits.len() >= 32 * 64);
        // PRBS7: every bit is the XOR of the bits 6 and 7 places back.
        for n in 7..bits.len() {
            assert_eq!(bits[n], bits[n - 7] ^ bits[n - 6], "bit {n}");
        }
    }
}

#[test]
fn differential_jsync_brings_the_link_up() {
    let s = settings(1, "");
    let mut link = LinkBuilder::new(s)
        .register_jsync(JsyncKind::Differential)
        .register_jref()
        .build()
        .unwrap();
    assert!(link.drive_jsync(JsyncLevel::Signal(true)).is_err());
    link.drive_jsync(JsyncLevel::Differential { p: true, n: false })
        .unwrap();
    link.set_enable(true);
    run_until_ready(&mut link);
    assert!(link.status().jsync);
}

#[test]
fn jsync_drop_clears_ready_but_keeps_lanes_up() {
    let mut link = link(2);
    start(&mut link);
    run_until_ready(&mut link);
    link.drive_jsync(JsyncLevel::Signal(false)).unwrap();
    link.run_for(SimTime::from_ns(200)).unwrap();
    assert!(!link.status().ready);
    assert!(link.status().serdes_done);
    assert!(!link.status().jsync);
    assert!(link.lanes().iter().all(|l| l.state() == BringupState::Ready));
}

#[test]
fn metastability_is_reproducible() {
    let run = || {
        let mut s = settings(2, "");
        s.metastability = true;
        let mut link = LinkBuilder::from_settings(s).build().unwrap();
        start(&mut link);
        run_until_ready(&mut link);
        link.take_events()
    };
    let first = run();
    assert_eq!(first, run());
}

#[test]
fn waveform_dump_contains_every_lane() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("link.vcd");
    let mut link = link(2);
    let file = fs::File::create(&path).unwrap();
    link.attach_recorder(Box::new(VcdRecorder::new(BufWriter::new(file))))
        .unwrap();
    start(&mut link);
    run_until_ready(&mut link);
    link.finish_waveform().unwrap();

    let vcd = fs::read_to_string(&path).unwrap();
    assert!(vcd.contains("$scope module it $end"));
    assert!(vcd.contains("$scope module lane0 $end"));
    assert!(vcd.contains("$scope module lane1 $end"));
    assert!(vcd.contains("$var wire 3"));
    assert!(vcd.contains("$dumpvars"));
    assert!(vcd.lines().filter(|l| l.starts_with('#')).count() > 10);
}
