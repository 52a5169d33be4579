//! Incremental call-tree construction shared by both trace formats
//!
//! Both parsers reduce their input to a time-ordered sequence of "enter
//! frame" / "leave frame" steps per thread. `TreeBuilder` turns that sequence
//! into a [`CaptureNode`] tree rooted at a synthetic thread node.

use crate::capture::CaptureNode;

#[derive(Debug, Default)]
pub(crate) struct TreeBuilder {
    /// Completed top-level nodes
    finished: Vec<CaptureNode>,
    /// Currently open path, outermost first
    open: Vec<CaptureNode>,
    last_global: f64,
    last_thread: f64,
    /// Leave steps that had no open frame
    pub(crate) unmatched_leaves: usize,
}

impl TreeBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn observe(&mut self, global: f64, thread: f64) {
        self.last_global = self.last_global.max(global);
        self.last_thread = self.last_thread.max(thread);
    }

    pub(crate) fn enter(&mut self, name: &str, global: f64, thread: f64) {
        self.observe(global, thread);
        let depth = self.open.len() + 1;
        self.open.push(CaptureNode::new(name, global, thread, depth));
    }

    /// Close the innermost open frame. Returns `false` if nothing was open.
    pub(crate) fn leave(&mut self, global: f64, thread: f64) -> bool {
        self.observe(global, thread);
        let Some(mut node) = self.open.pop() else {
            self.unmatched_leaves += 1;
            return false;
        };
        node.end_global = global.max(node.start_global);
        node.end_thread = thread.max(node.start_thread);
        self.attach(node);
        true
    }

    fn attach(&mut self, node: CaptureNode) {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.finished.push(node),
        }
    }

    /// Names along the open path, outermost first
    pub(crate) fn open_names(&self) -> impl Iterator<Item = &str> {
        self.open.iter().map(|n| n.name.as_str())
    }

    pub(crate) fn open_depth(&self) -> usize {
        self.open.len()
    }

    /// Close everything still open at the last observed time and wrap the
    /// result in a thread root. Returns `None` if the thread recorded nothing.
    pub(crate) fn finish(mut self, thread_name: &str) -> Option<CaptureNode> {
        let (global, thread) = (self.last_global, self.last_thread);
        while !self.open.is_empty() {
            self.leave(global, thread);
        }

        let first = self.finished.first()?;
        let mut root = CaptureNode::new(thread_name, first.start_global, first.start_thread, 0);
        for child in &self.finished {
            root.start_global = root.start_global.min(child.start_global);
            root.start_thread = root.start_thread.min(child.start_thread);
            root.end_global = root.end_global.max(child.end_global);
            root.end_thread = root.end_thread.max(child.end_thread);
        }
        root.children = self.finished;
        Some(root)
    }
}
