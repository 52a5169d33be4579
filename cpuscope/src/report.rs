//! Text output for the CLI
//!
//! Writers take `impl Write` so the same code prints to stdout and to a buffer
//! in tests.

// Microsecond values are displayed as milliseconds
#![allow(clippy::cast_precision_loss)]

use std::io::{self, Write};

use crate::analysis::FunctionHotspot;
use crate::capture::{Capture, ClockType};
use crate::selection::CaptureSelection;
use crate::session::SessionEvent;

fn ms(us: f64) -> String {
    format!("{:.2}ms", us / 1000.0)
}

fn clock_name(clock: ClockType) -> &'static str {
    match clock {
        ClockType::Global => "global clock",
        ClockType::Thread => "thread clock",
    }
}

/// Capture header, thread list and filter match counts
pub fn write_summary(
    out: &mut impl Write,
    capture: &Capture,
    selection: &CaptureSelection,
) -> io::Result<()> {
    writeln!(
        out,
        "{}: {}, {} threads, {}",
        capture.trace_id(),
        capture.format(),
        capture.threads().len(),
        ms(capture.duration_us())
    )?;
    for thread in capture.threads() {
        let nodes = capture.root(thread.id).map_or(0, crate::capture::CaptureNode::descendant_count);
        let marker = if selection.thread() == Some(thread.id) { '*' } else { ' ' };
        writeln!(out, " {marker}{} {} ({nodes} calls)", thread.id, thread.name)?;
    }
    if let (Some(filter), Some(counts)) = (selection.filter(), selection.filter_counts()) {
        writeln!(
            out,
            "filter {:?}: {} of {} calls match",
            filter.pattern(),
            counts.matched,
            counts.total
        )?;
    }
    Ok(())
}

/// Top `limit` hotspots, one per line
pub fn write_hotspots(
    out: &mut impl Write,
    hotspots: &[FunctionHotspot],
    limit: usize,
    clock: ClockType,
) -> io::Result<()> {
    writeln!(out, "HOTSPOTS ({})", clock_name(clock))?;
    if hotspots.is_empty() {
        writeln!(out, "  (no calls recorded)")?;
        return Ok(());
    }
    for hotspot in hotspots.iter().take(limit) {
        writeln!(
            out,
            "  {:>5.1}%  self {:>10}  total {:>10}  calls {:>6}  {}",
            hotspot.percentage,
            ms(hotspot.self_time),
            ms(hotspot.total_time),
            hotspot.count,
            hotspot.name
        )?;
    }
    if hotspots.len() > limit {
        writeln!(out, "  ... {} more", hotspots.len() - limit)?;
    }
    Ok(())
}

/// One-line description of a session event, for progress output.
///
/// Returns `None` for events that are not worth printing.
#[must_use]
pub fn describe_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::StateChanged(state) => Some(format!("state: {state}")),
        SessionEvent::ElapsedTime(elapsed) => Some(format!("recording: {elapsed}")),
        SessionEvent::CaptureChanged(Some(capture)) => {
            Some(format!("capture: {} ({} threads)", capture.trace_id(), capture.threads().len()))
        }
        SessionEvent::CaptureChanged(None) => Some("capture: none".to_string()),
        SessionEvent::Banner(banner) => Some(format!("{}: {}", banner.title, banner.body)),
        SessionEvent::ProfilingConfigurationChanged(config) => {
            Some(format!("configuration: {}", config.name))
        }
        SessionEvent::ThreadChanged(_)
        | SessionEvent::ClockTypeChanged(_)
        | SessionEvent::DetailsChanged(_)
        | SessionEvent::FilterChanged { .. } => None,
    }
}
