//! Garbage collector exclusion window

use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open slot range `[start, end)` the collector is currently working on
///
/// Allocation must never hand out an index inside an active window. A window
/// with `end <= start` excludes nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GcWindow {
    pub start: usize,
    pub end: usize,
}

impl GcWindow {
    /// No collection in progress
    pub const EMPTY: GcWindow = GcWindow { start: 0, end: 0 };

    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of excluded indices (`extra` space the table must keep clear)
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_active(&self) -> bool {
        self.end > self.start
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }
}

impl fmt::Display for GcWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds() {
        let window = GcWindow::new(2, 4);
        assert!(window.is_active());
        assert_eq!(window.len(), 2);
        assert!(!window.contains(1));
        assert!(window.contains(2));
        assert!(window.contains(3));
        assert!(!window.contains(4));
    }

    #[test]
    fn test_inverted_window_excludes_nothing() {
        let window = GcWindow::new(5, 2);
        assert!(!window.is_active());
        assert_eq!(window.len(), 0);
        assert!((0..10).all(|i| !window.contains(i)));
        assert!(!GcWindow::EMPTY.is_active());
    }
}
