//! Mock save provider for testing
//!
//! This module provides an in-memory provider with failure injection and
//! handle accounting, plus a matching storage setup.

use super::error::ProviderCode;
use super::provider::{SaveContainer, SaveProvider, SaveUpdate, StorageSetup, UserId};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Failures {
    create_container: Option<ProviderCode>,
    create_update: Option<ProviderCode>,
    blob_writes: HashMap<String, ProviderCode>,
    submit: Option<ProviderCode>,
}

#[derive(Default)]
struct MockState {
    /// (container, blob) → committed payload
    blobs: Mutex<HashMap<(String, String), Bytes>>,
    failures: Mutex<Failures>,
    open_containers: AtomicUsize,
    open_updates: AtomicUsize,
    submits: AtomicUsize,
}

/// In-memory save provider for testing
#[derive(Clone, Default)]
pub struct MockSaveProvider {
    state: Arc<MockState>,
}

impl MockSaveProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_container` fail with `code`
    pub fn fail_create_container(&self, code: ProviderCode) {
        self.state.failures.lock().create_container = Some(code);
    }

    /// Make `create_update` fail with `code`
    pub fn fail_create_update(&self, code: ProviderCode) {
        self.state.failures.lock().create_update = Some(code);
    }

    /// Make writes of the named blob fail with `code`
    pub fn fail_blob_write(&self, blob: &str, code: ProviderCode) {
        self.state
            .failures
            .lock()
            .blob_writes
            .insert(blob.to_string(), code);
    }

    /// Make update submission fail with `code`
    pub fn fail_submit(&self, code: ProviderCode) {
        self.state.failures.lock().submit = Some(code);
    }

    /// Committed payload of a blob
    pub fn blob(&self, container: &str, blob: &str) -> Option<Bytes> {
        self.state
            .blobs
            .lock()
            .get(&(container.to_string(), blob.to_string()))
            .cloned()
    }

    /// Number of committed blobs
    pub fn len(&self) -> usize {
        self.state.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.blobs.lock().is_empty()
    }

    /// Containers created and not yet closed
    pub fn open_containers(&self) -> usize {
        self.state.open_containers.load(Ordering::SeqCst)
    }

    /// Updates created and not yet closed
    pub fn open_updates(&self) -> usize {
        self.state.open_updates.load(Ordering::SeqCst)
    }

    /// Update submissions attempted
    pub fn submit_count(&self) -> usize {
        self.state.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SaveProvider for MockSaveProvider {
    async fn create_container(&self, name: &str) -> Result<Box<dyn SaveContainer>, ProviderCode> {
        if let Some(code) = self.state.failures.lock().create_container {
            return Err(code);
        }
        self.state.open_containers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockContainer {
            state: Arc::clone(&self.state),
            name: name.to_string(),
        }))
    }
}

struct MockContainer {
    state: Arc<MockState>,
    name: String,
}

#[async_trait]
impl SaveContainer for MockContainer {
    async fn create_update(
        &mut self,
        _display_name: &str,
    ) -> Result<Box<dyn SaveUpdate>, ProviderCode> {
        if let Some(code) = self.state.failures.lock().create_update {
            return Err(code);
        }
        self.state.open_updates.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockUpdate {
            state: Arc::clone(&self.state),
            container: self.name.clone(),
            staged: Vec::new(),
        }))
    }
}

impl Drop for MockContainer {
    fn drop(&mut self) {
        self.state.open_containers.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MockUpdate {
    state: Arc<MockState>,
    container: String,
    staged: Vec<(String, Bytes)>,
}

#[async_trait]
impl SaveUpdate for MockUpdate {
    fn submit_blob_write(&mut self, blob: &str, data: &Bytes) -> Result<(), ProviderCode> {
        if let Some(code) = self.state.failures.lock().blob_writes.get(blob) {
            return Err(*code);
        }
        self.staged.push((blob.to_string(), data.clone()));
        Ok(())
    }

    async fn submit(&mut self) -> Result<(), ProviderCode> {
        self.state.submits.fetch_add(1, Ordering::SeqCst);
        if let Some(code) = self.state.failures.lock().submit {
            return Err(code);
        }
        let mut blobs = self.state.blobs.lock();
        for (blob, data) in self.staged.drain(..) {
            blobs.insert((self.container.clone(), blob), data);
        }
        Ok(())
    }
}

impl Drop for MockUpdate {
    fn drop(&mut self) {
        self.state.open_updates.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Storage setup that hands out a [`MockSaveProvider`]
#[derive(Clone)]
pub struct MockSetup {
    provider: MockSaveProvider,
    delay: Duration,
    failure: Option<ProviderCode>,
    calls: Arc<AtomicUsize>,
}

impl MockSetup {
    pub fn new(provider: MockSaveProvider) -> Self {
        Self {
            provider,
            delay: Duration::ZERO,
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Take `delay` before reporting
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Report `code` instead of a provider
    pub fn failing(mut self, code: ProviderCode) -> Self {
        self.failure = Some(code);
        self
    }

    /// Times setup has run (shared between clones)
    pub fn setup_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageSetup for MockSetup {
    async fn setup(&self, _user: UserId) -> Result<Arc<dyn SaveProvider>, ProviderCode> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.failure {
            Some(code) => Err(code),
            None => Ok(Arc::new(self.provider.clone())),
        }
    }
}
