//! Free-range stack
//!
//! Slots believed free are tracked as closed intervals rather than
//! individual indices, so the collector can hand back a whole compacted
//! region in one push. Entries may go stale (re-occupied, or inside the
//! collector's window); the table re-validates every index it takes.

use std::fmt;

/// Closed interval `[lo, hi]` of slot indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRange {
    pub lo: usize,
    pub hi: usize,
}

impl FreeRange {
    pub fn new(lo: usize, hi: usize) -> Self {
        debug_assert!(lo <= hi, "inverted free range [{}, {}]", lo, hi);
        Self { lo, hi }
    }

    pub fn single(index: usize) -> Self {
        Self { lo: index, hi: index }
    }

    pub fn len(&self) -> usize {
        self.hi - self.lo + 1
    }
}

impl fmt::Display for FreeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

/// LIFO stack of free ranges
#[derive(Debug, Default)]
pub struct FreeRangeStack {
    ranges: Vec<FreeRange>,
}

impl FreeRangeStack {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn push(&mut self, range: FreeRange) {
        self.ranges.push(range);
    }

    /// Take the low end of the top range, popping the range once exhausted
    ///
    /// The caller decides whether the index is usable; a rejected index is
    /// consumed all the same.
    pub fn take_low(&mut self) -> Option<usize> {
        let top = self.ranges.last_mut()?;
        let index = top.lo;
        if top.lo >= top.hi {
            self.ranges.pop();
        } else {
            top.lo += 1;
        }
        Some(index)
    }

    /// Drop every tracked range
    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Number of ranges on the stack
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total indices covered, stale or not
    pub fn covered(&self) -> usize {
        self.ranges.iter().map(FreeRange::len).sum()
    }
}
