//! What the presentation layer is currently looking at
//!
//! [`CaptureSelection`] is plain state: the displayed capture, the selected
//! thread, clock and details view, plus an optional name filter with its
//! match counts. It is owned and mutated by the session on its control
//! context; readers get shared references.

use std::fmt;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::capture::{Capture, CaptureNode, ClockType};
use crate::domain::{FilterError, ThreadId};

/// Which analysis view the details panel shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailsType {
    TopDown,
    BottomUp,
    CallChart,
    FlameChart,
}

/// Method-name filter
///
/// Plain patterns match as substrings; regex patterns use `regex` syntax.
/// Matching ignores case unless `match_case` is set.
#[derive(Clone)]
pub struct CaptureFilter {
    pattern: String,
    is_regex: bool,
    match_case: bool,
    regex: Regex,
}

impl CaptureFilter {
    pub fn new(pattern: &str, is_regex: bool, match_case: bool) -> Result<Self, FilterError> {
        let source = if is_regex { pattern.to_string() } else { regex::escape(pattern) };
        let regex = RegexBuilder::new(&source)
            .case_insensitive(!match_case)
            .build()
            .map_err(|source| FilterError::InvalidPattern { pattern: pattern.to_string(), source })?;
        Ok(Self { pattern: pattern.to_string(), is_regex, match_case, regex })
    }

    /// Case-insensitive substring filter
    pub fn text(pattern: &str) -> Result<Self, FilterError> {
        Self::new(pattern, false, false)
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn is_regex(&self) -> bool {
        self.is_regex
    }

    #[must_use]
    pub fn match_case(&self) -> bool {
        self.match_case
    }

    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl PartialEq for CaptureFilter {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
            && self.is_regex == other.is_regex
            && self.match_case == other.match_case
    }
}

impl fmt::Debug for CaptureFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureFilter")
            .field("pattern", &self.pattern)
            .field("is_regex", &self.is_regex)
            .field("match_case", &self.match_case)
            .finish()
    }
}

/// How many method nodes the active filter matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterCounts {
    pub matched: usize,
    pub total: usize,
}

#[derive(Debug, Default)]
pub struct CaptureSelection {
    capture: Option<Arc<Capture>>,
    thread: Option<ThreadId>,
    clock_type: ClockType,
    details: Option<DetailsType>,
    filter: Option<CaptureFilter>,
    counts: Option<FilterCounts>,
}

impl CaptureSelection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn capture(&self) -> Option<&Arc<Capture>> {
        self.capture.as_ref()
    }

    #[must_use]
    pub fn thread(&self) -> Option<ThreadId> {
        self.thread
    }

    #[must_use]
    pub fn clock_type(&self) -> ClockType {
        self.clock_type
    }

    #[must_use]
    pub fn details(&self) -> Option<DetailsType> {
        self.details
    }

    #[must_use]
    pub fn filter(&self) -> Option<&CaptureFilter> {
        self.filter.as_ref()
    }

    /// Match counts for the active filter; `None` without a capture
    #[must_use]
    pub fn filter_counts(&self) -> Option<FilterCounts> {
        self.counts
    }

    /// Call tree of the selected thread
    #[must_use]
    pub fn selected_root(&self) -> Option<&CaptureNode> {
        self.capture.as_ref()?.root(self.thread?)
    }

    /// Replace the displayed capture.
    ///
    /// Resets the thread selection and recomputes filter counts against the
    /// new capture. The filter pattern itself is kept.
    pub fn set_capture(&mut self, capture: Option<Arc<Capture>>) {
        self.capture = capture;
        self.thread = None;
        self.counts = None;
        self.recount();
    }

    /// Record the selected thread. Returns whether the selection changed.
    pub fn set_thread(&mut self, thread: Option<ThreadId>) -> bool {
        let changed = self.thread != thread;
        self.thread = thread;
        changed
    }

    pub fn set_clock_type(&mut self, clock_type: ClockType) -> bool {
        let changed = self.clock_type != clock_type;
        self.clock_type = clock_type;
        changed
    }

    pub fn set_details(&mut self, details: Option<DetailsType>) -> bool {
        let changed = self.details != details;
        self.details = details;
        changed
    }

    /// Install (or clear, with `None`) the filter and recount matches
    pub fn set_filter(&mut self, filter: Option<CaptureFilter>) {
        self.filter = filter;
        self.recount();
    }

    fn recount(&mut self) {
        let Some(capture) = &self.capture else {
            return;
        };

        let mut counts = FilterCounts::default();
        for (_, root) in capture.roots() {
            // Thread roots are synthetic; only method nodes count
            for node in root.iter().skip(1) {
                counts.total += 1;
                if self.filter.as_ref().map_or(true, |f| f.matches(&node.name)) {
                    counts.matched += 1;
                }
            }
        }
        self.counts = Some(counts);
    }
}
