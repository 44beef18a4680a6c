//! Cloud Save Pipeline
//!
//! Collects named blob writes, optionally grouped into a batch, and commits
//! them to the save data user's storage on a background task.
//!
//! # Architecture
//!
//! ```text
//! SavePipeline (caller's thread)
//!   ├─→ begin_batch("save1")
//!   ├─→ submit_blob("a.dat", bytes) → OperationId   (copied, queued)
//!   └─→ end_batch() ──spawn──→ commit task
//!                                ├─→ UserDirectory::resolve_storage (poll setup)
//!                                ├─→ create container → create update
//!                                ├─→ submit blob writes  (per-item failures)
//!                                └─→ submit update       (shared outcome)
//!                                      │
//!                                      ▼
//!                        SaveOutcome { id, result } on an mpsc channel
//! ```
//!
//! Once a batch is handed over, errors only surface through outcomes.

mod commit;
pub mod error;
pub mod local;
pub mod mock;
pub mod outcome;
pub mod pipeline;
pub mod provider;
pub mod users;

pub use error::{ProviderCode, SaveError};
pub use local::{LocalSaveProvider, LocalSetup};
pub use mock::{MockSaveProvider, MockSetup};
pub use outcome::{OperationId, OutcomeReceiver, SaveOutcome};
pub use pipeline::{split_container_path, PendingSave, SavePipeline};
pub use provider::{SaveContainer, SaveProvider, SaveUpdate, StorageHandle, StorageSetup, UserId};
pub use users::{StorageStatus, UserDirectory};
