//! Filesystem-backed save provider
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   └─→ user-<id>/          ← one provider per user
//!        └─→ <container>/
//!             └─→ <blob>   ← written on submit (temp file + rename)
//! ```
//!
//! Blob writes are staged in memory and only reach disk when the update is
//! submitted. Dropping an update discards whatever it staged.

use super::error::ProviderCode;
use super::provider::{SaveContainer, SaveProvider, SaveUpdate, StorageSetup, UserId};
use crate::config::SaveSettings;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Suffix for blobs being written
const PARTIAL_SUFFIX: &str = ".partial";
/// Suffix for the previous copy of a blob while an update is placed
const PREVIOUS_SUFFIX: &str = ".previous";

fn io_code(e: &io::Error) -> ProviderCode {
    let code = match e.kind() {
        io::ErrorKind::PermissionDenied => ProviderCode::NO_ACCESS,
        io::ErrorKind::WriteZero | io::ErrorKind::OutOfMemory => {
            ProviderCode::OUT_OF_LOCAL_STORAGE
        }
        _ => ProviderCode::CONTAINER_SYNC_FAILED,
    };
    warn!(error = %e, %code, "Local save I/O failed");
    code
}

/// Relative path made only of plain components
fn is_plain_relative(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('\\')
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Sets up a [`LocalSaveProvider`] per user under a shared root
#[derive(Debug, Clone)]
pub struct LocalSetup {
    root: PathBuf,
    max_update_bytes: usize,
}

impl LocalSetup {
    pub fn new<P: AsRef<Path>>(root: P, max_update_bytes: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_update_bytes,
        }
    }

    pub fn from_settings(settings: &SaveSettings) -> Self {
        Self::new(&settings.root, settings.max_update_bytes)
    }
}

#[async_trait]
impl StorageSetup for LocalSetup {
    async fn setup(&self, user: UserId) -> Result<Arc<dyn SaveProvider>, ProviderCode> {
        let root = self.root.join(user.to_string());
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| io_code(&e))?;
        info!(%user, path = ?root, "Local save storage ready");
        Ok(Arc::new(LocalSaveProvider::new(root, self.max_update_bytes)))
    }
}

/// Save provider storing containers as directories
#[derive(Debug, Clone)]
pub struct LocalSaveProvider {
    root: PathBuf,
    max_update_bytes: usize,
}

impl LocalSaveProvider {
    pub fn new<P: AsRef<Path>>(root: P, max_update_bytes: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_update_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a committed blob lives on disk
    pub fn blob_path(&self, container: &str, blob: &str) -> PathBuf {
        self.root.join(container).join(blob)
    }
}

#[async_trait]
impl SaveProvider for LocalSaveProvider {
    async fn create_container(&self, name: &str) -> Result<Box<dyn SaveContainer>, ProviderCode> {
        if !is_plain_relative(name) {
            warn!(container = name, "Rejected container name");
            return Err(ProviderCode::INVALID_CONTAINER_NAME);
        }

        let dir = self.root.join(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_code(&e))?;
        debug!(path = ?dir, "Opened local container");

        Ok(Box::new(LocalContainer {
            dir,
            max_update_bytes: self.max_update_bytes,
        }))
    }
}

struct LocalContainer {
    dir: PathBuf,
    max_update_bytes: usize,
}

#[async_trait]
impl SaveContainer for LocalContainer {
    async fn create_update(
        &mut self,
        _display_name: &str,
    ) -> Result<Box<dyn SaveUpdate>, ProviderCode> {
        Ok(Box::new(LocalUpdate {
            dir: self.dir.clone(),
            max_update_bytes: self.max_update_bytes,
            staged: Vec::new(),
            staged_bytes: 0,
        }))
    }
}

struct LocalUpdate {
    dir: PathBuf,
    max_update_bytes: usize,
    staged: Vec<(String, Bytes)>,
    staged_bytes: usize,
}

/// A blob moved into its final place by the current submit
struct Placed {
    path: PathBuf,
    previous: Option<PathBuf>,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

impl LocalUpdate {
    fn partial_path(path: &Path) -> PathBuf {
        with_suffix(path, PARTIAL_SUFFIX)
    }

    async fn write_partial(path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(Self::partial_path(path), data).await
    }

    async fn discard_partials(paths: &[PathBuf]) {
        for path in paths {
            // Best effort; a stale partial file is never read back
            let _ = tokio::fs::remove_file(Self::partial_path(path)).await;
        }
    }

    /// Move a written blob into place, keeping any existing file aside
    async fn place(path: &Path) -> io::Result<Placed> {
        let previous = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_file() => {
                let previous = with_suffix(path, PREVIOUS_SUFFIX);
                tokio::fs::rename(path, &previous).await?;
                Some(previous)
            }
            _ => None,
        };

        if let Err(e) = tokio::fs::rename(Self::partial_path(path), path).await {
            if let Some(previous) = &previous {
                let _ = tokio::fs::rename(previous, path).await;
            }
            return Err(e);
        }

        Ok(Placed {
            path: path.to_path_buf(),
            previous,
        })
    }

    /// Undo placed blobs, newest first
    async fn roll_back(placed: &[Placed]) {
        for blob in placed.iter().rev() {
            let restored = match &blob.previous {
                Some(previous) => tokio::fs::rename(previous, &blob.path).await,
                None => tokio::fs::remove_file(&blob.path).await,
            };
            if let Err(e) = restored {
                error!(path = ?blob.path, error = %e, "Failed to roll back blob");
            }
        }
    }
}

#[async_trait]
impl SaveUpdate for LocalUpdate {
    fn submit_blob_write(&mut self, blob: &str, data: &Bytes) -> Result<(), ProviderCode> {
        if !is_plain_relative(blob) {
            return Err(ProviderCode::INVALID_ARGUMENT);
        }
        let total = self.staged_bytes + data.len();
        if total > self.max_update_bytes {
            return Err(ProviderCode::UPDATE_TOO_BIG);
        }

        self.staged_bytes = total;
        self.staged.push((blob.to_string(), data.clone()));
        Ok(())
    }

    /// Write every staged blob or none of them
    async fn submit(&mut self) -> Result<(), ProviderCode> {
        let staged = std::mem::take(&mut self.staged);
        self.staged_bytes = 0;

        // Write everything aside first so a failure leaves old blobs intact
        let mut written = Vec::with_capacity(staged.len());
        for (blob, data) in &staged {
            let path = self.dir.join(blob);
            let result = Self::write_partial(&path, data).await;
            written.push(path);
            if let Err(e) = result {
                Self::discard_partials(&written).await;
                return Err(io_code(&e));
            }
        }

        let mut placed = Vec::with_capacity(written.len());
        for (n, path) in written.iter().enumerate() {
            match Self::place(path).await {
                Ok(blob) => placed.push(blob),
                Err(e) => {
                    Self::roll_back(&placed).await;
                    Self::discard_partials(&written[n..]).await;
                    return Err(io_code(&e));
                }
            }
        }

        for blob in &placed {
            if let Some(previous) = &blob.previous {
                let _ = tokio::fs::remove_file(previous).await;
            }
        }

        debug!(dir = ?self.dir, blobs = placed.len(), "Committed local update");
        Ok(())
    }
}
