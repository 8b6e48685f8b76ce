//! `jesdsim run`: brings a link up and reports how far it got.
//!
//! The run enables the link with JSYNC deasserted, waits for the aggregate
//! serdes-done, asserts JSYNC the way a converter would once its receiver is
//! locked, and keeps running until the requested time has elapsed.

use std::fs::File;
use std::io::BufWriter;

use jesd_common::{LaneId, SimTime};
use jesd_sim::{BringupState, JsyncLevel, Link, LinkBuilder, LinkEvent, LinkStatus, VcdRecorder};
use serde::Serialize;

use crate::pipeline::{load_link, parse_duration};
use crate::{GlobalArgs, ReportFormat, RunArgs};

/// Final state of one lane.
#[derive(Debug, Serialize)]
struct LaneReport {
    lane: LaneId,
    state: BringupState,
    done: bool,
    link_layer_ready: bool,
    watchdog_restarts: u64,
}

/// Everything `run` prints.
#[derive(Debug, Serialize)]
struct RunReport {
    link: String,
    time: SimTime,
    jsync_asserted_at: Option<SimTime>,
    status: LinkStatus,
    lanes: Vec<LaneReport>,
    warnings: usize,
    events: Vec<LinkEvent>,
}

/// Runs the `jesdsim run` command.
///
/// Returns exit code 0 if the link reached the expected end state: `ready`,
/// or just `serdes_done` when JSYNC is withheld.
pub fn run(args: &RunArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let duration = parse_duration(&args.time)?;
    let (_, settings) = load_link(global)?;
    let jsync_kind = settings.jsync;

    let mut link = LinkBuilder::from_settings(settings).build()?;
    if let Some(ref path) = args.vcd {
        let file = File::create(path).map_err(|e| format!("cannot create '{path}': {e}"))?;
        link.attach_recorder(Box::new(VcdRecorder::new(BufWriter::new(file))))?;
    }

    if let Some(select) = args.prbs {
        if select > 4 && !global.quiet {
            eprintln!("warning: PRBS select {select} is not a pattern, serializers stay in data mode");
        }
        link.set_test_pattern(select);
    }
    link.set_stpl_enable(args.stpl);

    if !global.quiet {
        eprintln!(
            "     Running {} ({} lanes) for {duration}",
            link.name(),
            link.lane_count()
        );
    }

    let jsync_asserted_at = drive(&mut link, duration, jsync_kind.filter(|_| !args.no_jsync))?;
    if args.vcd.is_some() {
        link.finish_waveform()?;
    }

    let report = build_report(&mut link, jsync_asserted_at);
    match args.format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => {
            if !global.quiet {
                print!("{}", render_text(&report, global.verbose));
            }
        }
    }

    let reached = if args.no_jsync {
        report.status.serdes_done
    } else {
        report.status.ready
    };
    Ok(if reached { 0 } else { 1 })
}

/// Enables the link and runs it for `duration`, asserting JSYNC as soon as
/// serdes-done is observed. Returns when JSYNC was asserted.
fn drive(
    link: &mut Link,
    duration: SimTime,
    jsync: Option<jesd_config::JsyncKind>,
) -> Result<Option<SimTime>, Box<dyn std::error::Error>> {
    let end = link.now() + duration;
    if let Some(kind) = jsync {
        link.drive_jsync(JsyncLevel::for_kind(kind, false))?;
    }
    link.drive_jref(true);
    link.set_enable(true);

    let mut asserted_at = None;
    if let Some(kind) = jsync {
        if link.run_until(|l| l.status().serdes_done, duration)? {
            link.drive_jsync(JsyncLevel::for_kind(kind, true))?;
            asserted_at = Some(link.now());
        }
    }
    link.run_for(end - link.now())?;
    Ok(asserted_at)
}

fn build_report(link: &mut Link, jsync_asserted_at: Option<SimTime>) -> RunReport {
    let lanes = link
        .lanes()
        .iter()
        .map(|lane| LaneReport {
            lane: lane.id(),
            state: lane.state(),
            done: lane.done(),
            link_layer_ready: link.link_layer_ready(lane.id().index()),
            watchdog_restarts: lane.watchdog_restarts(),
        })
        .collect();
    RunReport {
        link: link.name().to_string(),
        time: link.now(),
        jsync_asserted_at,
        status: link.status(),
        lanes,
        warnings: link.events().warning_count(),
        events: link.take_events(),
    }
}

fn render_text(report: &RunReport, verbose: bool) -> String {
    let mut out = String::new();
    if verbose {
        for event in &report.events {
            out.push_str(&format!("{event}\n"));
        }
    }
    let flag = |b: bool| if b { "yes" } else { "no" };
    out.push_str(&format!("link {} at {}\n", report.link, report.time));
    out.push_str(&format!(
        "  ready: {}  serdes_done: {}  jsync: {}\n",
        flag(report.status.ready),
        flag(report.status.serdes_done),
        flag(report.status.jsync)
    ));
    if let Some(t) = report.jsync_asserted_at {
        out.push_str(&format!("  jsync asserted at {t}\n"));
    }
    for lane in &report.lanes {
        out.push_str(&format!(
            "  {}: {:<24} link layer {}",
            lane.lane,
            lane.state.to_string(),
            if lane.link_layer_ready { "data" } else { "sync" }
        ));
        if lane.watchdog_restarts > 0 {
            out.push_str(&format!("  ({} watchdog restarts)", lane.watchdog_restarts));
        }
        out.push('\n');
    }
    if report.warnings > 0 {
        out.push_str(&format!("  {} warning(s)\n", report.warnings));
    }
    out
}
