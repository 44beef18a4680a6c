//! Single-writer thread check

use std::panic::Location;
use std::thread::{self, ThreadId};
use tracing::error;

/// Remembers the thread that created a slot table
///
/// Mutating a table from any other thread is a contract violation: the
/// table has no locks, so it is reported and the call aborts.
#[derive(Debug, Clone)]
pub struct ThreadGuard {
    owner: ThreadId,
    owner_name: Option<String>,
}

impl ThreadGuard {
    /// Bind to the current thread
    pub fn current() -> Self {
        let current = thread::current();
        Self {
            owner: current.id(),
            owner_name: current.name().map(str::to_string),
        }
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Panic unless called from the owning thread
    ///
    /// The panic message names `operation` and the caller's source location.
    #[track_caller]
    pub fn check(&self, operation: &str) {
        if self.is_owner() {
            return;
        }

        let location = Location::caller();
        let current = thread::current();
        let message = format!(
            "slot table {} called off its owning thread at {}:{} (owner {:?} '{}', caller {:?} '{}'); \
             objects must only be created on the main thread",
            operation,
            location.file(),
            location.line(),
            self.owner,
            self.owner_name.as_deref().unwrap_or("<unnamed>"),
            current.id(),
            current.name().unwrap_or("<unnamed>"),
        );
        error!(
            operation,
            file = location.file(),
            line = location.line(),
            "Slot table thread contract violated"
        );
        panic!("{}", message);
    }
}
