//! # cpuscope - Main Entry Point
//!
//! Runs one full capture lifecycle against the replay profiler:
//! start → record for `--duration` seconds → stop → parse → report.
//!
//! Progress (state changes, elapsed time, banners) goes to stderr; the capture
//! summary and hotspot table go to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use log::info;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use cpuscope::analysis::analyze_hotspots;
use cpuscope::capture::ClockType;
use cpuscope::cli::Args;
use cpuscope::config::SessionConfig;
use cpuscope::domain::ThreadId;
use cpuscope::remote::{MonotonicClock, ReplayClient};
use cpuscope::report::{describe_event, write_hotspots, write_summary};
use cpuscope::selection::CaptureFilter;
use cpuscope::session::{CaptureSession, CaptureState, SessionEvent};
use cpuscope_common::{TargetRef, TraceFormat};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_DATAERR: i32 = 65;
const EXIT_NOINPUT: i32 = 66;

/// How long to wait for the replay profiler to acknowledge start/stop
const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);
/// How long parsing may take before giving up
const PARSE_TIMEOUT: Duration = Duration::from_secs(300);
/// Feature level reported for the replay target; every configuration applies
const REPLAY_FEATURE_LEVEL: u32 = u32::MAX;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("no such file") || msg.contains("failed to read") {
        EXIT_NOINPUT
    } else if msg.contains("invalid filter") || msg.contains("invalid configuration") {
        EXIT_USAGE
    } else if msg.contains("parse") {
        EXIT_DATAERR
    } else {
        EXIT_ERROR
    }
}

/// Print everything observers have been told so far
fn drain_events(events: &Receiver<SessionEvent>, quiet: bool) -> Option<String> {
    let mut last_banner = None;
    for event in events.try_iter() {
        if let SessionEvent::Banner(banner) = &event {
            last_banner = Some(format!("{}: {}", banner.title, banner.body));
        }
        if !quiet {
            if let Some(line) = describe_event(&event) {
                eprintln!("{line}");
            }
        }
    }
    last_banner
}

fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let config = match &args.config {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    let clock = Arc::new(MonotonicClock::new());
    let client = Arc::new(ReplayClient::new(&args.trace, clock.clone()));
    let target = TargetRef {
        pid: std::process::id(),
        name: args.trace.file_name().map_or_else(
            || args.trace.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        ),
        feature_level: REPLAY_FEATURE_LEVEL,
    };

    if !quiet {
        println!("cpuscope v{}", env!("CARGO_PKG_VERSION"));
        println!("trace: {}", args.trace.display());
    }

    let mut session = CaptureSession::builder(target, client)
        .clock(clock)
        .config(config)
        .connect()
        .context("Failed to connect capture session")?;
    let events = session.subscribe();
    session.enter();

    // Pick a configuration whose mode produces the requested format
    if let Some(format) = args.format.map(TraceFormat::from) {
        let config = session
            .profiling_configurations()
            .into_iter()
            .find(|c| c.mode.trace_format() == format)
            .with_context(|| format!("No profiling configuration records {format} traces"))?;
        session.set_profiling_configuration(config);
    }
    if let Some(pattern) = &args.filter {
        let filter = CaptureFilter::new(pattern, args.regex, args.match_case)?;
        session.set_filter(Some(filter));
    }
    if args.thread_clock {
        session.set_clock_type(ClockType::Thread);
    }

    // ── Record ──────────────────────────────────────────────────────────
    if session.state() == CaptureState::Idle {
        session.start_capturing()?;
        session.run_until(REMOTE_TIMEOUT, |s| s.state() != CaptureState::Starting);
    }
    let banner = drain_events(&events, quiet);
    if session.state() != CaptureState::Capturing {
        anyhow::bail!(banner.unwrap_or_else(|| "Recording did not start".to_string()));
    }
    info!("Recording with '{}'", session.profiling_configuration().name);

    let deadline = std::time::Instant::now() + Duration::from_secs(args.duration);
    loop {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        // Wake at least once a second to print elapsed time
        session.run_until(remaining.min(Duration::from_secs(1)), |_| false);
        drain_events(&events, quiet);
    }

    // ── Stop and parse ──────────────────────────────────────────────────
    session.stop_capturing()?;
    let settled =
        session.run_until(REMOTE_TIMEOUT + PARSE_TIMEOUT, |s| s.state() == CaptureState::Idle);
    let banner = drain_events(&events, quiet);
    if !settled {
        anyhow::bail!("Timed out waiting for the trace (state {})", session.state());
    }
    let Some(capture) = session.capture().cloned() else {
        anyhow::bail!(banner.unwrap_or_else(|| "Trace was not parsed".to_string()));
    };

    // ── Report ──────────────────────────────────────────────────────────
    if let Some(tid) = args.thread {
        if capture.thread(ThreadId(tid)).is_none() {
            anyhow::bail!("Invalid filter: trace has no thread {tid}");
        }
        session.set_selected_thread(Some(ThreadId(tid)));
    }

    let selection = session.selection();
    let mut hotspots = analyze_hotspots(&capture, selection.clock_type(), selection.thread());
    if let Some(filter) = selection.filter() {
        hotspots.retain(|h| filter.matches(&h.name));
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if !quiet {
        write_summary(&mut out, &capture, selection)?;
        writeln!(out)?;
    }
    write_hotspots(&mut out, &hotspots, args.top, selection.clock_type())?;
    out.flush()?;

    session.exit();
    Ok(())
}
