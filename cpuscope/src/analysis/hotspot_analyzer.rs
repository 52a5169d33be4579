//! Hotspot analysis for parsed captures.
//!
//! This module aggregates call-tree nodes by function name to identify
//! performance hotspots - functions whose own code (self time) consumes the
//! most of the recording.
//!
//! # Time Accounting
//!
//! - **Self time** - node duration minus its children's durations
//! - **Total time** - node duration, counted once per outermost activation so
//!   that recursion does not inflate it
//!
//! Both are read from the selected [`ClockType`]; thread roots are synthetic
//! and never reported.
//!
//! # Performance
//!
//! - O(nodes) to walk every tree with an explicit stack, so arbitrarily deep
//!   traces are fine
//! - O(n log n) where n = unique functions (sorting)

// Percentage calculations intentionally convert usize to f64
#![allow(clippy::cast_precision_loss)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::capture::{Capture, CaptureNode, ClockType};
use crate::domain::ThreadId;

/// Maximum distinct call paths to store per hotspot.
///
/// A function called from many places would otherwise keep every caller
/// chain alive; five shows the main call patterns.
const MAX_CALL_PATHS_PER_HOTSPOT: usize = 5;

/// A function with aggregated timing across the analyzed threads.
///
/// ```text
/// HOTSPOTS (1.25s, global clock)
/// ──────────────────────────────────────────────
///   BitmapFactory.decode     42.3%  self 528.1ms
///   JSONObject.<init>        18.7%  self 233.4ms
/// ```
#[derive(Debug, Clone)]
pub struct FunctionHotspot {
    /// Function name as recorded in the trace
    pub name: String,

    /// Number of calls (call-tree nodes)
    pub count: usize,

    /// Time in the function and its callees, microseconds
    pub total_time: f64,

    /// Time in the function's own code, microseconds
    pub self_time: f64,

    /// Share of all analyzed self time (0.0 - 100.0)
    pub percentage: f64,

    /// Per-thread self time: thread → microseconds
    pub threads: HashMap<ThreadId, f64>,

    /// Representative caller chains (outermost first, ending at the function)
    pub call_paths: Vec<Arc<Vec<String>>>,
}

#[derive(Debug, Default)]
struct FunctionStats {
    count: usize,
    total_time: f64,
    self_time: f64,
    threads: HashMap<ThreadId, f64>,
    seen_paths: HashSet<Vec<String>>,
    call_paths: Vec<Arc<Vec<String>>>,
}

/// Analyze a capture to identify function hotspots.
///
/// Aggregates method nodes by name across every thread, or only `thread` when
/// given, and sorts by self time (descending).
#[must_use]
pub fn analyze_hotspots(
    capture: &Capture,
    clock: ClockType,
    thread: Option<ThreadId>,
) -> Vec<FunctionHotspot> {
    let mut functions: HashMap<String, FunctionStats> = HashMap::new();

    for (tid, root) in capture.roots() {
        if thread.is_some_and(|wanted| wanted != tid) {
            continue;
        }
        visit_thread(root, tid, clock, &mut functions);
    }

    let total_self: f64 = functions.values().map(|s| s.self_time).sum();
    let mut hotspots: Vec<FunctionHotspot> = functions
        .into_iter()
        .map(|(name, stats)| {
            let percentage =
                if total_self > 0.0 { (stats.self_time / total_self) * 100.0 } else { 0.0 };
            FunctionHotspot {
                name,
                count: stats.count,
                total_time: stats.total_time,
                self_time: stats.self_time,
                percentage,
                threads: stats.threads,
                call_paths: stats.call_paths,
            }
        })
        .collect();

    // Ties broken by name so output is stable
    hotspots.sort_by(|a, b| b.self_time.total_cmp(&a.self_time).then_with(|| a.name.cmp(&b.name)));
    hotspots
}

/// Pre-order walk below a thread root, tracking the active call path
fn visit_thread(
    root: &CaptureNode,
    tid: ThreadId,
    clock: ClockType,
    functions: &mut HashMap<String, FunctionStats>,
) {
    let mut path: Vec<&str> = Vec::new();
    // Occurrences of each name on `path`
    let mut active: HashMap<&str, usize> = HashMap::new();
    // (node, length of its caller path)
    let mut pending: Vec<(&CaptureNode, usize)> =
        root.children.iter().rev().map(|child| (child, 0)).collect();

    while let Some((node, depth)) = pending.pop() {
        for name in path.drain(depth..) {
            if let Some(count) = active.get_mut(name) {
                *count -= 1;
            }
        }
        let on_path = active.entry(node.name.as_str()).or_insert(0);
        let recursive = *on_path > 0;
        *on_path += 1;
        path.push(&node.name);

        let self_time = node.self_duration(clock);
        let stats = functions.entry(node.name.clone()).or_default();
        stats.count += 1;
        stats.self_time += self_time;
        *stats.threads.entry(tid).or_insert(0.0) += self_time;
        if !recursive {
            stats.total_time += node.duration(clock);
        }
        if stats.call_paths.len() < MAX_CALL_PATHS_PER_HOTSPOT {
            let owned: Vec<String> = path.iter().map(ToString::to_string).collect();
            if stats.seen_paths.insert(owned.clone()) {
                stats.call_paths.push(Arc::new(owned));
            }
        }

        let depth = path.len();
        pending.extend(node.children.iter().rev().map(|child| (child, depth)));
    }
}
