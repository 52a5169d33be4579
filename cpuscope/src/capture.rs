//! Capture data model
//!
//! A [`Capture`] is the immutable result of parsing one trace recording: one
//! call tree per thread plus the overall time range. Captures are produced by
//! the parser, owned by the trace cache (behind an `Arc`) and only referenced
//! by the selection.
//!
//! All times in this module are microseconds, matching trace-event JSON.

use std::collections::BTreeMap;
use std::fmt;

use cpuscope_common::{TraceFormat, TraceId};

use crate::domain::ThreadId;

/// Which clock node intervals are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockType {
    /// Wall clock shared by all threads
    #[default]
    Global,
    /// Per-thread CPU clock (time the thread was actually running)
    Thread,
}

/// Closed interval in microseconds; `min > max` means empty
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// A range that contains nothing; expanding it yields the expanded interval
    #[must_use]
    pub fn empty() -> Self {
        Self { min: f64::INFINITY, max: f64::NEG_INFINITY }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max - self.min
        }
    }

    pub fn expand(&mut self, min: f64, max: f64) {
        self.min = self.min.min(min);
        self.max = self.max.max(max);
    }

    #[must_use]
    pub fn union(mut self, other: &Range) -> Range {
        if !other.is_empty() {
            self.expand(other.min, other.max);
        }
        self
    }

    #[must_use]
    pub fn intersects(&self, other: &Range) -> bool {
        !self.is_empty() && !other.is_empty() && self.min <= other.max && other.min <= self.max
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::empty()
    }
}

/// A thread present in the capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: String,
}

/// One node of a per-thread call tree
///
/// The root of each thread's tree is a synthetic node named after the thread
/// that spans all of its children.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureNode {
    pub name: String,
    pub start_global: f64,
    pub end_global: f64,
    pub start_thread: f64,
    pub end_thread: f64,
    /// Distance from the thread root (root = 0)
    pub depth: usize,
    pub children: Vec<CaptureNode>,
}

impl CaptureNode {
    pub fn new(name: impl Into<String>, start_global: f64, start_thread: f64, depth: usize) -> Self {
        Self {
            name: name.into(),
            start_global,
            end_global: start_global,
            start_thread,
            end_thread: start_thread,
            depth,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn start(&self, clock: ClockType) -> f64 {
        match clock {
            ClockType::Global => self.start_global,
            ClockType::Thread => self.start_thread,
        }
    }

    #[must_use]
    pub fn end(&self, clock: ClockType) -> f64 {
        match clock {
            ClockType::Global => self.end_global,
            ClockType::Thread => self.end_thread,
        }
    }

    #[must_use]
    pub fn duration(&self, clock: ClockType) -> f64 {
        (self.end(clock) - self.start(clock)).max(0.0)
    }

    /// Time spent in this node and not in any child
    #[must_use]
    pub fn self_duration(&self, clock: ClockType) -> f64 {
        let children: f64 = self.children.iter().map(|c| c.duration(clock)).sum();
        (self.duration(clock) - children).max(0.0)
    }

    /// Global-clock interval of this node
    #[must_use]
    pub fn global_range(&self) -> Range {
        Range::new(self.start_global, self.end_global)
    }

    /// Number of nodes below this one
    #[must_use]
    pub fn descendant_count(&self) -> usize {
        self.iter().count() - 1
    }

    /// Pre-order traversal starting at (and including) this node
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter { stack: vec![self] }
    }
}

impl Drop for CaptureNode {
    // Trees can be hundreds of thousands of frames deep; dropping them
    // recursively would overflow the stack
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Pre-order iterator over a call tree
pub struct NodeIter<'a> {
    stack: Vec<&'a CaptureNode>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = &'a CaptureNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Structured result of parsing one trace recording
pub struct Capture {
    trace_id: TraceId,
    format: TraceFormat,
    range: Range,
    threads: Vec<ThreadInfo>,
    roots: BTreeMap<ThreadId, CaptureNode>,
}

impl Capture {
    /// Build a capture from per-thread call trees.
    ///
    /// The capture range is the union of every thread root's global interval,
    /// so zero threads yields an empty range.
    pub fn new(
        trace_id: TraceId,
        format: TraceFormat,
        threads: impl IntoIterator<Item = (ThreadInfo, CaptureNode)>,
    ) -> Self {
        let mut infos = Vec::new();
        let mut roots = BTreeMap::new();
        let mut range = Range::empty();

        for (info, root) in threads {
            range = range.union(&root.global_range());
            roots.insert(info.id, root);
            infos.push(info);
        }
        infos.sort_by_key(|t| t.id);

        Self { trace_id, format, range, threads: infos, roots }
    }

    #[must_use]
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    #[must_use]
    pub fn format(&self) -> TraceFormat {
        self.format
    }

    #[must_use]
    pub fn range(&self) -> Range {
        self.range
    }

    /// Length of the capture range in microseconds
    #[must_use]
    pub fn duration_us(&self) -> f64 {
        self.range.length()
    }

    /// Threads sorted by ID
    #[must_use]
    pub fn threads(&self) -> &[ThreadInfo] {
        &self.threads
    }

    #[must_use]
    pub fn thread(&self, id: ThreadId) -> Option<&ThreadInfo> {
        self.threads.iter().find(|t| t.id == id)
    }

    /// Root of a thread's call tree
    #[must_use]
    pub fn root(&self, id: ThreadId) -> Option<&CaptureNode> {
        self.roots.get(&id)
    }

    pub fn roots(&self) -> impl Iterator<Item = (ThreadId, &CaptureNode)> {
        self.roots.iter().map(|(id, node)| (*id, node))
    }

    /// Number of method nodes across all threads (thread roots excluded)
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.roots.values().map(CaptureNode::descendant_count).sum()
    }
}

// Summarized: the derived form would recurse through every call tree
impl fmt::Debug for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capture")
            .field("trace_id", &self.trace_id)
            .field("format", &self.format)
            .field("range", &self.range)
            .field("threads", &self.threads)
            .field("nodes", &self.node_count())
            .finish()
    }
}
