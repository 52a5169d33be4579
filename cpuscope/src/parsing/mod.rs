//! # Trace Parsing
//!
//! Turns a raw [`TracePayload`] into a [`Capture`]. Parsing is CPU-bound and
//! proportional to payload size, so it never runs on the control context: the
//! [`TraceCache`] dispatches it to a worker pool and hands callers a
//! [`ParseHandle`].
//!
//! ## Formats
//!
//! - `instrumented` - trace-event JSON with `B`/`E`/`X` method events
//! - `sampled` - trace-event JSON with `stackFrames` and `samples`
//!
//! Both formats read thread names from `M` (`thread_name`) metadata events.
//!
//! ## Failure Modes
//!
//! Truncated JSON, unknown format tags and malformed events are reported as
//! [`ParseError`]s and surface as [`ParseOutcome::Failure`]. A payload that
//! parses but contains no threads is a valid, empty capture.

use std::collections::HashMap;
use std::sync::Arc;

use cpuscope_common::{TraceFormat, TraceId, TracePayload};
use log::{debug, warn};
use serde::Deserialize;

use crate::capture::{Capture, CaptureNode, ThreadInfo};
use crate::domain::{ParseError, ThreadId};

pub mod cache;
mod instrumented;
mod sampled;
mod tree;

pub use cache::{ParseHandle, TraceCache};
pub use tokio_util::sync::CancellationToken;

/// How often (in events) the parsers poll their cancel token
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Result of parsing one trace
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Success(Arc<Capture>),
    Failure(String),
    Cancelled,
}

impl ParseOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ParseOutcome::Success(_))
    }

    #[must_use]
    pub fn capture(&self) -> Option<&Arc<Capture>> {
        match self {
            ParseOutcome::Success(capture) => Some(capture),
            _ => None,
        }
    }

    pub(crate) fn from_result(result: Result<Capture, ParseError>) -> Self {
        match result {
            Ok(capture) => ParseOutcome::Success(Arc::new(capture)),
            Err(ParseError::Cancelled) => ParseOutcome::Cancelled,
            Err(e) => ParseOutcome::Failure(e.to_string()),
        }
    }
}

/// Bail out of a parse loop once cancellation has been requested
pub fn check_cancelled(cancel: &CancellationToken) -> Result<(), ParseError> {
    if cancel.is_cancelled() {
        Err(ParseError::Cancelled)
    } else {
        Ok(())
    }
}

/// A trace-to-capture transformation
///
/// Implementations must not keep mutable state across calls; the cache may
/// run several parses at once on different workers.
pub trait ParseTrace: Send + Sync {
    fn parse(
        &self,
        trace_id: TraceId,
        payload: &TracePayload,
        cancel: &CancellationToken,
    ) -> Result<Capture, ParseError>;
}

/// The built-in parser for sampled and instrumented trace-event JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceParser;

impl ParseTrace for TraceParser {
    fn parse(
        &self,
        trace_id: TraceId,
        payload: &TracePayload,
        cancel: &CancellationToken,
    ) -> Result<Capture, ParseError> {
        let format = payload
            .format()
            .ok_or_else(|| ParseError::UnrecognizedFormat(payload.format_tag()))?;
        if payload.is_empty() {
            return Err(ParseError::Empty);
        }

        debug!("Parsing {trace_id}: {} bytes, {format}", payload.len());
        let threads = match format {
            TraceFormat::Instrumented => instrumented::parse(payload.bytes(), cancel)?,
            TraceFormat::Sampled => sampled::parse(payload.bytes(), cancel)?,
        };

        if threads.is_empty() {
            warn!("{trace_id} contains no thread activity");
        }
        Ok(Capture::new(trace_id, format, threads))
    }
}

// ============================================================================
// Shared trace-event JSON pieces
// ============================================================================

/// One entry of a `traceEvents` array; unknown fields are ignored
#[derive(Debug, Deserialize)]
pub(crate) struct RawEvent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ph: String,
    #[serde(default)]
    pub ts: Option<f64>,
    #[serde(default)]
    pub dur: Option<f64>,
    #[serde(default)]
    pub tts: Option<f64>,
    #[serde(default)]
    pub tdur: Option<f64>,
    #[serde(default)]
    pub tid: Option<u32>,
    #[serde(default)]
    pub args: Option<serde_json::Value>,
}

/// Collect `thread_name` metadata: tid → name
pub(crate) fn thread_names(events: &[RawEvent]) -> HashMap<u32, String> {
    events
        .iter()
        .filter(|e| e.ph == "M" && e.name.as_deref() == Some("thread_name"))
        .filter_map(|e| {
            let tid = e.tid?;
            let name = e.args.as_ref()?.get("name")?.as_str()?;
            Some((tid, name.to_string()))
        })
        .collect()
}

pub(crate) fn default_thread_name(tid: u32) -> String {
    format!("Thread {tid}")
}

/// Pair finished thread roots with their display names
pub(crate) fn into_threads(
    roots: impl IntoIterator<Item = (u32, CaptureNode)>,
) -> Vec<(ThreadInfo, CaptureNode)> {
    roots
        .into_iter()
        .map(|(tid, root)| (ThreadInfo { id: ThreadId(tid), name: root.name.clone() }, root))
        .collect()
}
