//! Slot Table
//!
//! Hands out small integer handles for engine objects and cooperates with an
//! incremental, compacting garbage collector.
//!
//! # Architecture
//!
//! ```text
//! SlotTable<T>
//!   ├─→ entries:     [A, -, C, D, -, -, G, -]
//!   ├─→ free ranges: [5,5] [1,1] [7,7]  ← top
//!   ├─→ last freed:  1 (scan hint)
//!   └─→ guard:       owning ThreadId
//!
//! allocate(owner, GcWindow [2, 5))
//!   1. grow if count >= capacity - window.len()
//!   2. pop free ranges, skipping stale or windowed indices
//!   3. fall back to a linear scan from the hint, around the window
//! ```
//!
//! The collector publishes the window it is working on with every call; any
//! index inside it is off limits until the next call. After compaction it can
//! purge the range stack and hand back whole regions with `add_free_range`.

pub mod guard;
pub mod range;
pub mod table;
pub mod window;

pub use guard::ThreadGuard;
pub use range::{FreeRange, FreeRangeStack};
pub use table::{AllocStrategy, SlotTable, SlotTableStats};
pub use window::GcWindow;
