//! Save provider traits
//!
//! The pipeline talks to the platform's cloud save service only through
//! these traits. Handles are released by dropping them.

use super::error::ProviderCode;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Local user that owns save data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user-{}", self.0)
    }
}

/// Per-user save storage (one per signed-in user)
#[async_trait]
pub trait SaveProvider: Send + Sync {
    /// Open or create a named container
    async fn create_container(&self, name: &str) -> Result<Box<dyn SaveContainer>, ProviderCode>;
}

/// Open container; closed on drop
#[async_trait]
pub trait SaveContainer: Send {
    /// Start an update that replaces blobs in this container
    async fn create_update(
        &mut self,
        display_name: &str,
    ) -> Result<Box<dyn SaveUpdate>, ProviderCode>;
}

/// Pending container update; closed on drop, discarding unsubmitted writes
#[async_trait]
pub trait SaveUpdate: Send {
    /// Queue a blob write as part of this update
    fn submit_blob_write(&mut self, blob: &str, data: &Bytes) -> Result<(), ProviderCode>;

    /// Commit every queued write at once
    async fn submit(&mut self) -> Result<(), ProviderCode>;
}

/// Brings up a user's storage
///
/// May take a long time (sign-in, sync with the service); the user
/// directory runs it once in the background and polls for completion.
#[async_trait]
pub trait StorageSetup: Send + Sync {
    async fn setup(&self, user: UserId) -> Result<Arc<dyn SaveProvider>, ProviderCode>;
}

/// Shared reference to a user's ready storage
///
/// Reference counted; clone to share, drop to release. The provider is torn
/// down when the last handle (including the directory's own) goes away.
#[derive(Clone)]
pub struct StorageHandle {
    user: UserId,
    provider: Arc<dyn SaveProvider>,
}

impl StorageHandle {
    pub fn new(user: UserId, provider: Arc<dyn SaveProvider>) -> Self {
        Self { user, provider }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn provider(&self) -> &dyn SaveProvider {
        self.provider.as_ref()
    }

    /// Live references to the underlying provider
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.provider)
    }
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("user", &self.user)
            .field("refs", &self.ref_count())
            .finish()
    }
}
