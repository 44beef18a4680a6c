//! Slot table implementation

use super::guard::ThreadGuard;
use super::range::{FreeRange, FreeRangeStack};
use super::window::GcWindow;
use crate::config::SlotSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace};

/// How freed indices are handed out again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocStrategy {
    /// Recycle freed slots, preferring the most recently freed low indices
    Reuse,
    /// Never reuse an index (debugging stale handles)
    Unique,
}

/// Indirection table from small integer handles to engine objects
///
/// `T` is the handle stored per slot; the table does not own whatever the
/// handle points at. Indices are stable until freed, and growth never moves
/// an occupied slot.
///
/// Only the thread that created the table may allocate or free.
#[derive(Debug)]
pub struct SlotTable<T> {
    /// One entry per slot, `None` when free
    entries: Vec<Option<T>>,
    /// Occupied slots
    count: usize,
    /// Scan start hint, always `< capacity`
    last_freed: usize,
    /// Ranges believed free (may be stale)
    free_ranges: FreeRangeStack,
    strategy: AllocStrategy,
    /// Bump cursor for `AllocStrategy::Unique`
    next_unique: usize,
    guard: ThreadGuard,
}

impl<T> SlotTable<T> {
    /// Create a table that recycles slots
    ///
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        Self::with_strategy(capacity, AllocStrategy::Reuse)
    }

    /// Create a table bound to the calling thread
    pub fn with_strategy(capacity: usize, strategy: AllocStrategy) -> Self {
        let capacity = capacity.max(1);

        let mut entries = Vec::new();
        reserve_or_abort(&mut entries, capacity);
        entries.resize_with(capacity, || None);

        let mut free_ranges = FreeRangeStack::new();
        if strategy == AllocStrategy::Reuse {
            free_ranges.push(FreeRange::new(0, capacity - 1));
        }

        info!(capacity, ?strategy, "Created slot table");

        Self {
            entries,
            count: 0,
            last_freed: 0,
            free_ranges,
            strategy,
            next_unique: 0,
            guard: ThreadGuard::current(),
        }
    }

    /// Create a table from configuration
    pub fn from_settings(settings: &SlotSettings) -> Self {
        Self::with_strategy(settings.initial_capacity, settings.strategy())
    }

    /// Store `owner` in a free slot outside `window` and return its index
    ///
    /// Grows the table when needed.
    ///
    /// # Panics
    ///
    /// When called from a thread other than the one that created the table,
    /// or when the backing store cannot grow.
    #[track_caller]
    pub fn allocate(&mut self, owner: T, window: GcWindow) -> usize {
        self.guard.check("allocate");

        let index = match self.strategy {
            AllocStrategy::Reuse => {
                let index = self.select_reusable(window);
                self.last_freed = index;
                index
            }
            AllocStrategy::Unique => self.select_unique(window),
        };

        debug_assert!(self.entries[index].is_none(), "slot {} handed out twice", index);
        debug_assert!(!window.contains(index), "slot {} inside GC window {}", index, window);

        self.entries[index] = Some(owner);
        self.count += 1;
        trace!(index, count = self.count, %window, "Allocated slot");
        index
    }

    /// Clear a slot and return its handle
    ///
    /// Freeing an empty or out-of-range slot does nothing.
    #[track_caller]
    pub fn free(&mut self, index: usize) -> Option<T> {
        self.guard.check("free");

        let owner = self.entries.get_mut(index)?.take()?;
        self.count -= 1;

        if self.strategy == AllocStrategy::Reuse {
            self.free_ranges.push(FreeRange::single(index));
            self.last_freed = self.last_freed.min(index);
        }

        trace!(index, count = self.count, "Freed slot");
        Some(owner)
    }

    /// Forget all tracked free ranges (after the collector compacts)
    pub fn purge_free_ranges(&mut self) {
        debug!(ranges = self.free_ranges.len(), "Purged free range stack");
        self.free_ranges.clear();
    }

    /// Declare `[first, last]` free; `last` defaults to the final slot
    ///
    /// `last` is clamped to the table. Nothing is recorded if the clamped
    /// range is empty, or when slots are never reused.
    pub fn add_free_range(&mut self, first: usize, last: Option<usize>) {
        if self.strategy == AllocStrategy::Unique {
            return;
        }
        let max = self.capacity() - 1;
        let last = last.map_or(max, |l| l.min(max));
        if last < first {
            return;
        }
        self.free_ranges.push(FreeRange::new(first, last));
        trace!(first, last, "Added free range");
    }

    /// Bias the next scan to start at `index` without freeing anything
    pub fn set_last_freed_hint(&mut self, index: usize) {
        if self.strategy == AllocStrategy::Reuse {
            self.last_freed = index.min(self.capacity() - 1);
        }
    }

    /// Handle stored at `index`, if any
    pub fn lookup(&self, index: usize) -> Option<&T> {
        self.entries.get(index)?.as_ref()
    }

    /// Occupied slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|owner| (index, owner)))
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn strategy(&self) -> AllocStrategy {
        self.strategy
    }

    /// Number of ranges on the free-range stack
    pub fn free_range_count(&self) -> usize {
        self.free_ranges.len()
    }

    pub fn stats(&self) -> SlotTableStats {
        SlotTableStats {
            capacity: self.capacity(),
            count: self.count,
            free_ranges: self.free_ranges.len(),
            free_range_slots: self.free_ranges.covered(),
            last_freed: self.last_freed,
            strategy: self.strategy,
        }
    }

    fn is_usable(&self, index: usize, window: GcWindow) -> bool {
        !window.contains(index) && matches!(self.entries.get(index), Some(None))
    }

    fn select_reusable(&mut self, window: GcWindow) -> usize {
        let extra = window.len();
        if self.count >= self.capacity().saturating_sub(extra) {
            self.grow_around(extra);
        }

        loop {
            if let Some(index) = self.pop_free_range(window) {
                return index;
            }
            if let Some(index) = self.scan(window) {
                return index;
            }
            // Only reachable when the window extends past the table
            debug!(%window, capacity = self.capacity(), "No slot outside GC window, growing");
            self.grow_around(extra);
        }
    }

    /// Take indices off the free-range stack until one is usable
    fn pop_free_range(&mut self, window: GcWindow) -> Option<usize> {
        while let Some(index) = self.free_ranges.take_low() {
            if self.is_usable(index, window) {
                return Some(index);
            }
        }
        None
    }

    /// Linear search for an empty slot starting at the hint, skipping `window`
    fn scan(&self, window: GcWindow) -> Option<usize> {
        let capacity = self.capacity();
        let extra = window.len();
        let hint = self.last_freed;

        // Phase 1: hint up to the window
        let first_end = capacity.min(window.start);
        if let Some(index) = (hint..first_end).find(|&i| self.is_usable(i, window)) {
            return Some(index);
        }

        // Phase 2: past the window to the end, then wrap round to its start
        let second_start = hint.max(window.end);
        let steps = capacity
            .saturating_sub(extra)
            .saturating_sub(second_start - window.end);
        let mut index = second_start;
        for _ in 0..steps {
            if index >= capacity {
                index = 0;
            }
            if self.is_usable(index, window) {
                return Some(index);
            }
            index += 1;
        }

        // Phase 3: the hint started inside the window
        let third_end = capacity.min(hint);
        (window.end..third_end).find(|&i| self.is_usable(i, window))
    }

    fn select_unique(&mut self, window: GcWindow) -> usize {
        let mut index = self.next_unique;
        if window.contains(index) {
            index = window.end;
        }
        while index >= self.capacity() {
            self.grow_around(0);
        }
        self.next_unique = index + 1;
        index
    }

    /// Grow by half again, leaving `extra` slots for the collector's window
    fn grow_around(&mut self, extra: usize) {
        let old_capacity = self.capacity();
        let new_capacity = (old_capacity + extra)
            .checked_mul(3)
            .map(|n| (n / 2).max(old_capacity + extra + 1))
            .unwrap_or_else(|| fatal_exhausted(old_capacity, "capacity overflow"));

        reserve_or_abort(&mut self.entries, new_capacity - old_capacity);
        self.entries.resize_with(new_capacity, || None);

        if self.strategy == AllocStrategy::Reuse {
            self.free_ranges
                .push(FreeRange::new(old_capacity, new_capacity - 1));
        }

        debug!(old_capacity, new_capacity, extra, "Grew slot table");
    }
}

/// Snapshot of table bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTableStats {
    pub capacity: usize,
    pub count: usize,
    pub free_ranges: usize,
    pub free_range_slots: usize,
    pub last_freed: usize,
    pub strategy: AllocStrategy,
}

fn reserve_or_abort<T>(entries: &mut Vec<Option<T>>, additional: usize) {
    if let Err(e) = entries.try_reserve_exact(additional) {
        fatal_exhausted(entries.len(), &e.to_string());
    }
}

fn fatal_exhausted(capacity: usize, reason: &str) -> ! {
    error!(capacity, reason, "Slot table backing store exhausted");
    panic!(
        "slot table backing store exhausted at capacity {}: {}",
        capacity, reason
    );
}
