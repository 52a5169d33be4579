//! Instrumented trace decoding
//!
//! Reads trace-event JSON where every method entry/exit is recorded:
//!
//! ```json
//! {"traceEvents": [
//!   {"ph": "M", "name": "thread_name", "tid": 1, "args": {"name": "main"}},
//!   {"ph": "B", "name": "onCreate", "tid": 1, "ts": 100.0, "tts": 80.0},
//!   {"ph": "X", "name": "inflate", "tid": 1, "ts": 120.0, "dur": 30.0},
//!   {"ph": "E", "tid": 1, "ts": 200.0, "tts": 150.0}
//! ]}
//! ```
//!
//! `X` (complete) events are split into an enter and a leave step so they nest
//! with `B`/`E` pairs by time.

use std::collections::{BTreeMap, HashMap};

use log::debug;
use serde::Deserialize;

use super::tree::TreeBuilder;
use super::{
    check_cancelled, default_thread_name, into_threads, thread_names, CancellationToken, RawEvent,
    CANCEL_CHECK_INTERVAL,
};
use crate::capture::{CaptureNode, ThreadInfo};
use crate::domain::ParseError;

#[derive(Debug, Deserialize)]
struct InstrumentedTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<RawEvent>,
}

#[derive(Debug)]
enum Step<'a> {
    Enter(&'a str),
    Leave,
}

/// One time-ordered step on a thread
#[derive(Debug)]
struct TimedStep<'a> {
    global: f64,
    thread: f64,
    /// Position in the input, breaks timestamp ties
    seq: usize,
    step: Step<'a>,
}

pub(super) fn parse(
    bytes: &[u8],
    cancel: &CancellationToken,
) -> Result<Vec<(ThreadInfo, CaptureNode)>, ParseError> {
    let trace: InstrumentedTrace = serde_json::from_slice(bytes)?;
    let names = thread_names(&trace.trace_events);

    let mut steps: HashMap<u32, Vec<TimedStep<'_>>> = HashMap::new();
    for (seq, event) in trace.trace_events.iter().enumerate() {
        if seq % CANCEL_CHECK_INTERVAL == 0 {
            check_cancelled(cancel)?;
        }

        let (Some(tid), Some(ts)) = (event.tid, event.ts) else {
            continue;
        };
        let tts = event.tts.unwrap_or(ts);
        let thread_steps = steps.entry(tid).or_default();

        match event.ph.as_str() {
            "B" => {
                let name = event.name.as_deref().ok_or_else(|| {
                    ParseError::Malformed(format!("begin event without a name at index {seq}"))
                })?;
                thread_steps.push(TimedStep { global: ts, thread: tts, seq, step: Step::Enter(name) });
            }
            "E" => {
                thread_steps.push(TimedStep { global: ts, thread: tts, seq, step: Step::Leave });
            }
            "X" => {
                let name = event.name.as_deref().ok_or_else(|| {
                    ParseError::Malformed(format!("complete event without a name at index {seq}"))
                })?;
                let dur = event.dur.ok_or_else(|| {
                    ParseError::Malformed(format!("complete event {name:?} has no duration"))
                })?;
                if dur < 0.0 {
                    return Err(ParseError::Malformed(format!(
                        "complete event {name:?} has negative duration"
                    )));
                }
                let tdur = event.tdur.unwrap_or(dur);
                thread_steps.push(TimedStep { global: ts, thread: tts, seq, step: Step::Enter(name) });
                thread_steps.push(TimedStep {
                    global: ts + dur,
                    thread: tts + tdur,
                    seq,
                    step: Step::Leave,
                });
            }
            _ => {}
        }
    }

    // BTreeMap keeps thread order deterministic
    let mut roots = BTreeMap::new();
    for (tid, mut thread_steps) in steps {
        check_cancelled(cancel)?;
        // Stable sort: equal keys keep input order, so an X's enter stays before its leave
        thread_steps.sort_by(|a, b| a.global.total_cmp(&b.global).then(a.seq.cmp(&b.seq)));

        let mut builder = TreeBuilder::new();
        for step in &thread_steps {
            match step.step {
                Step::Enter(name) => builder.enter(name, step.global, step.thread),
                Step::Leave => {
                    builder.leave(step.global, step.thread);
                }
            }
        }
        if builder.unmatched_leaves > 0 {
            debug!("tid {tid}: ignored {} unmatched end events", builder.unmatched_leaves);
        }

        let name = names.get(&tid).cloned().unwrap_or_else(|| default_thread_name(tid));
        if let Some(root) = builder.finish(&name) {
            roots.insert(tid, root);
        }
    }

    Ok(into_threads(roots))
}
