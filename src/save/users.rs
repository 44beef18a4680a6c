//! Per-user storage resolution
//!
//! Each registered user carries a small state machine:
//!
//! ```text
//! Uninitialized ──resolve──→ SettingUp ──setup ok──→ Ready(handle)
//!                                 └──────setup err──→ Failed(code)
//! ```
//!
//! Setup runs once, in the background. Resolvers poll the state with a fixed
//! sleep until it leaves `SettingUp`.

use super::error::{ProviderCode, SaveError};
use super::provider::{SaveProvider, StorageHandle, StorageSetup, UserId};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Observable storage state for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageStatus {
    Uninitialized,
    SettingUp,
    Ready,
    Failed,
}

enum StorageState {
    Uninitialized,
    SettingUp,
    Ready(StorageHandle),
    Failed(ProviderCode),
}

impl StorageState {
    fn status(&self) -> StorageStatus {
        match self {
            StorageState::Uninitialized => StorageStatus::Uninitialized,
            StorageState::SettingUp => StorageStatus::SettingUp,
            StorageState::Ready(_) => StorageStatus::Ready,
            StorageState::Failed(_) => StorageStatus::Failed,
        }
    }
}

struct UserStorage {
    state: Mutex<StorageState>,
}

impl UserStorage {
    fn new() -> Self {
        Self {
            state: Mutex::new(StorageState::Uninitialized),
        }
    }

    fn status(&self) -> StorageStatus {
        self.state.lock().status()
    }
}

/// Marks setup failed if the setup task ends without reporting
struct SetupGuard {
    user: UserId,
    storage: Arc<UserStorage>,
    finished: bool,
}

impl SetupGuard {
    fn finish(mut self, result: Result<Arc<dyn SaveProvider>, ProviderCode>) {
        let next = match result {
            Ok(provider) => {
                info!(user = %self.user, "Save storage ready");
                StorageState::Ready(StorageHandle::new(self.user, provider))
            }
            Err(code) => {
                warn!(user = %self.user, %code, "Save storage setup failed");
                StorageState::Failed(code)
            }
        };
        *self.storage.state.lock() = next;
        self.finished = true;
    }
}

impl Drop for SetupGuard {
    fn drop(&mut self) {
        if !self.finished {
            warn!(user = %self.user, "Save storage setup abandoned");
            *self.storage.state.lock() = StorageState::Failed(ProviderCode::SETUP_FAILED);
        }
    }
}

/// Registered users and the one whose storage saves go to
pub struct UserDirectory {
    users: DashMap<UserId, Arc<UserStorage>>,
    save_data_user: RwLock<Option<UserId>>,
    setup: Arc<dyn StorageSetup>,
    poll_interval: Duration,
}

impl UserDirectory {
    pub fn new(setup: Arc<dyn StorageSetup>, poll_interval: Duration) -> Self {
        Self {
            users: DashMap::new(),
            save_data_user: RwLock::new(None),
            setup,
            poll_interval,
        }
    }

    /// Make a user known; storage stays uninitialized until first resolved
    pub fn register_user(&self, user: UserId) {
        self.users
            .entry(user)
            .or_insert_with(|| Arc::new(UserStorage::new()));
        debug!(%user, "Registered user");
    }

    /// Forget a user, releasing the directory's storage reference
    ///
    /// Commits already holding a handle keep it until they finish.
    pub fn remove_user(&self, user: UserId) -> bool {
        let mut save_user = self.save_data_user.write();
        if *save_user == Some(user) {
            *save_user = None;
        }
        self.users.remove(&user).is_some()
    }

    /// Direct future saves at `user`, or lock saving with `None`
    pub fn set_save_data_user(&self, user: Option<UserId>) {
        *self.save_data_user.write() = user;
        info!(user = ?user, "Save data user changed");
    }

    pub fn save_data_user(&self) -> Option<UserId> {
        *self.save_data_user.read()
    }

    pub fn storage_status(&self, user: UserId) -> Option<StorageStatus> {
        self.users.get(&user).map(|storage| storage.status())
    }

    /// Resolve storage for the current save data user
    pub async fn resolve_storage(&self) -> Result<StorageHandle, SaveError> {
        let user = self.save_data_user().ok_or(SaveError::UserNotFound)?;
        self.resolve_storage_for(user).await
    }

    /// Resolve a user's storage, running setup the first time
    ///
    /// Waits (polling) for as long as setup takes.
    pub async fn resolve_storage_for(&self, user: UserId) -> Result<StorageHandle, SaveError> {
        let storage = self
            .users
            .get(&user)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(SaveError::UserNotFound)?;

        self.start_setup(user, &storage);

        while storage.status() == StorageStatus::SettingUp {
            tokio::time::sleep(self.poll_interval).await;
        }

        let state = storage.state.lock();
        match &*state {
            StorageState::Ready(handle) => Ok(handle.clone()),
            StorageState::Failed(code) => Err(SaveError::classify(*code)),
            StorageState::Uninitialized | StorageState::SettingUp => {
                Err(SaveError::ProviderSetupFailed)
            }
        }
    }

    fn start_setup(&self, user: UserId, storage: &Arc<UserStorage>) {
        {
            let mut state = storage.state.lock();
            if !matches!(*state, StorageState::Uninitialized) {
                return;
            }
            *state = StorageState::SettingUp;
        }

        debug!(%user, "Starting save storage setup");
        let setup = Arc::clone(&self.setup);
        let guard = SetupGuard {
            user,
            storage: Arc::clone(storage),
            finished: false,
        };
        tokio::spawn(async move {
            let result = setup.setup(user).await;
            guard.finish(result);
        });
    }
}

impl std::fmt::Debug for UserDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDirectory")
            .field("users", &self.users.len())
            .field("save_data_user", &self.save_data_user())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
