//! Sampled trace decoding
//!
//! Reads trace-event JSON carrying periodic stack samples:
//!
//! ```json
//! {
//!   "traceEvents": [{"ph": "M", "name": "thread_name", "tid": 1, "args": {"name": "main"}}],
//!   "stackFrames": {"1": {"name": "main"}, "2": {"name": "work", "parent": "1"}},
//!   "samples": [{"tid": 1, "ts": 0, "sf": 2}, {"tid": 1, "ts": 1000, "sf": 1}]
//! }
//! ```
//!
//! A frame's node opens at the first sample whose stack contains it and closes
//! at the first later sample whose stack no longer does. Frames still on the
//! stack at the last sample close there.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use super::tree::TreeBuilder;
use super::{
    check_cancelled, default_thread_name, into_threads, thread_names, CancellationToken, RawEvent,
    CANCEL_CHECK_INTERVAL,
};
use crate::capture::{CaptureNode, ThreadInfo};
use crate::domain::ParseError;

/// Stack frame reference: trace writers use both numbers and strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FrameRef {
    Number(u64),
    Text(String),
}

impl FrameRef {
    fn key(&self) -> String {
        match self {
            FrameRef::Number(n) => n.to_string(),
            FrameRef::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StackFrame {
    name: String,
    #[serde(default)]
    parent: Option<FrameRef>,
}

#[derive(Debug, Deserialize)]
struct Sample {
    tid: u32,
    ts: f64,
    #[serde(default)]
    tts: Option<f64>,
    sf: FrameRef,
}

#[derive(Debug, Deserialize)]
struct SampledTrace {
    #[serde(rename = "traceEvents", default)]
    trace_events: Vec<RawEvent>,
    #[serde(rename = "stackFrames", default)]
    stack_frames: HashMap<String, StackFrame>,
    #[serde(default)]
    samples: Vec<Sample>,
}

/// Resolves frame IDs to root-first name paths, memoized per frame
struct StackResolver<'a> {
    frames: &'a HashMap<String, StackFrame>,
    resolved: HashMap<String, Vec<&'a str>>,
}

impl<'a> StackResolver<'a> {
    fn new(frames: &'a HashMap<String, StackFrame>) -> Self {
        Self { frames, resolved: HashMap::new() }
    }

    fn resolve(&mut self, leaf: &FrameRef) -> Result<&[&'a str], ParseError> {
        let key = leaf.key();
        if !self.resolved.contains_key(&key) {
            let mut path = Vec::new();
            let mut current = Some(key.clone());
            while let Some(id) = current {
                // A parent chain longer than the frame table must contain a cycle
                if path.len() > self.frames.len() {
                    return Err(ParseError::Malformed(format!(
                        "stack frame {key} has a cyclic parent chain"
                    )));
                }
                let frame = self
                    .frames
                    .get(&id)
                    .ok_or_else(|| ParseError::Malformed(format!("unknown stack frame {id}")))?;
                path.push(frame.name.as_str());
                current = frame.parent.as_ref().map(FrameRef::key);
            }
            path.reverse();
            self.resolved.insert(key.clone(), path);
        }
        Ok(self.resolved.get(&key).map_or(&[][..], Vec::as_slice))
    }
}

pub(super) fn parse(
    bytes: &[u8],
    cancel: &CancellationToken,
) -> Result<Vec<(ThreadInfo, CaptureNode)>, ParseError> {
    let trace: SampledTrace = serde_json::from_slice(bytes)?;
    let names = thread_names(&trace.trace_events);
    let mut resolver = StackResolver::new(&trace.stack_frames);

    let mut by_thread: BTreeMap<u32, Vec<&Sample>> = BTreeMap::new();
    for sample in &trace.samples {
        by_thread.entry(sample.tid).or_default().push(sample);
    }

    let mut roots = BTreeMap::new();
    let mut processed = 0usize;
    for (tid, mut samples) in by_thread {
        samples.sort_by(|a, b| a.ts.total_cmp(&b.ts));

        let mut builder = TreeBuilder::new();
        for sample in samples {
            if processed % CANCEL_CHECK_INTERVAL == 0 {
                check_cancelled(cancel)?;
            }
            processed += 1;

            let global = sample.ts;
            let thread = sample.tts.unwrap_or(global);
            let stack = resolver.resolve(&sample.sf)?;

            let common = builder
                .open_names()
                .zip(stack.iter())
                .take_while(|(open, frame)| open == *frame)
                .count();
            while builder.open_depth() > common {
                builder.leave(global, thread);
            }
            for frame in &stack[common..] {
                builder.enter(frame, global, thread);
            }
        }

        let name = names.get(&tid).cloned().unwrap_or_else(|| default_thread_name(tid));
        if let Some(root) = builder.finish(&name) {
            roots.insert(tid, root);
        }
    }

    Ok(into_threads(roots))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(json: &str) -> Result<Vec<(ThreadInfo, CaptureNode)>, ParseError> {
        parse(json.as_bytes(), &CancellationToken::new())
    }

    const TRACE: &str = r#"{
        "traceEvents": [{"ph": "M", "name": "thread_name", "tid": 1, "args": {"name": "main"}}],
        "stackFrames": {
            "1": {"name": "main"},
            "2": {"name": "load", "parent": "1"},
            "3": {"name": "decode", "parent": 2},
            "4": {"name": "draw", "parent": "1"}
        },
        "samples": [
            {"tid": 1, "ts": 0, "sf": 3},
            {"tid": 1, "ts": 100, "sf": "3"},
            {"tid": 1, "ts": 200, "sf": 2},
            {"tid": 1, "ts": 300, "sf": 4},
            {"tid": 1, "ts": 400, "sf": 4}
        ]
    }"#;

    #[test]
    fn test_samples_build_call_tree() {
        let threads = parse_str(TRACE).unwrap();
        assert_eq!(threads.len(), 1);

        let (info, root) = &threads[0];
        assert_eq!(info.name, "main");
        assert_eq!((root.start_global, root.end_global), (0.0, 400.0));

        let main = &root.children[0];
        assert_eq!(main.name, "main");
        assert_eq!(main.children.len(), 2);

        let load = &main.children[0];
        assert_eq!((load.name.as_str(), load.start_global, load.end_global), ("load", 0.0, 300.0));
        let decode = &load.children[0];
        assert_eq!(
            (decode.name.as_str(), decode.start_global, decode.end_global),
            ("decode", 0.0, 200.0)
        );

        let draw = &main.children[1];
        assert_eq!((draw.name.as_str(), draw.start_global, draw.end_global), ("draw", 300.0, 400.0));
    }

    #[test]
    fn test_unknown_frame_is_malformed() {
        let err = parse_str(r#"{"stackFrames": {}, "samples": [{"tid": 1, "ts": 0, "sf": 9}]}"#)
            .unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn test_cyclic_frames_are_malformed() {
        let err = parse_str(
            r#"{
                "stackFrames": {"1": {"name": "a", "parent": 2}, "2": {"name": "b", "parent": 1}},
                "samples": [{"tid": 1, "ts": 0, "sf": 1}]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn test_no_samples_yields_no_threads() {
        let threads = parse_str(r#"{"stackFrames": {"1": {"name": "a"}}, "samples": []}"#).unwrap();
        assert!(threads.is_empty());
    }
}
