//! Per-directory summary accumulators, one per open directory.
//!
//! Independent of filesystem I/O: the engine drives it with
//! `open`/`add_entry`/`close` in walk order.

use crate::event::{Entry, Summary};

/// Stack of open directory summaries, indexed by depth.
#[derive(Debug, Default)]
pub struct AccumulatorStack {
    open: Vec<Summary>,
    peak: usize,
}

impl AccumulatorStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an accumulator for a directory being entered.
    pub fn open(&mut self) {
        self.open.push(Summary::default());
        self.peak = self.peak.max(self.open.len());
    }

    /// Add a file or binary entry to the innermost open directory.
    ///
    /// A no-op when nothing is open (explicit file roots).
    pub fn add_entry(&mut self, entry: &Entry) {
        if let Some(top) = self.open.last_mut() {
            top.add_entry(entry);
        }
    }

    /// Freeze the innermost accumulator, fold it into its parent, and
    /// return it.
    pub fn close(&mut self) -> Option<Summary> {
        let closed = self.open.pop()?;
        if let Some(parent) = self.open.last_mut() {
            parent.absorb(&closed);
        }
        Some(closed)
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Deepest nesting reached so far.
    pub fn peak_depth(&self) -> usize {
        self.peak
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}
