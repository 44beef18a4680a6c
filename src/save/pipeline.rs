//! Save batching front end

use super::commit::commit_batch;
use super::outcome::{OperationId, OutcomeReceiver, OutcomeSink};
use super::users::UserDirectory;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// One blob waiting to be committed
///
/// The payload is copied at submission; the caller's buffer can be reused
/// straight away.
#[derive(Debug, Clone)]
pub struct PendingSave {
    pub id: OperationId,
    pub name: String,
    pub data: Bytes,
}

/// Blobs collected between `begin_batch` and `end_batch`
#[derive(Debug)]
struct SaveBatch {
    container: String,
    items: Vec<PendingSave>,
}

/// Split `path` into (container, blob) at the last `/` or `\`
///
/// A bare name lands in the unnamed container.
pub fn split_container_path(path: &str) -> (&str, &str) {
    match path.rfind(|c: char| c == '/' || c == '\\') {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("", path),
    }
}

/// Collects blob writes and commits them in the background
///
/// Every submitted blob gets one [`SaveOutcome`](super::SaveOutcome) on the
/// receiver returned by [`SavePipeline::new`]. Commits never block the
/// caller and cannot be cancelled.
pub struct SavePipeline {
    directory: Arc<UserDirectory>,
    runtime: Handle,
    sink: OutcomeSink,
    batch: Option<SaveBatch>,
}

impl SavePipeline {
    /// Create a pipeline that spawns commits onto the current tokio runtime
    pub fn new(directory: Arc<UserDirectory>) -> Result<(Self, OutcomeReceiver)> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Internal(format!("Save pipeline needs a tokio runtime: {}", e)))?;
        Ok(Self::with_runtime(directory, runtime))
    }

    /// Create a pipeline that spawns commits onto `runtime`
    pub fn with_runtime(directory: Arc<UserDirectory>, runtime: Handle) -> (Self, OutcomeReceiver) {
        let (sink, receiver) = OutcomeSink::channel();
        let pipeline = Self {
            directory,
            runtime,
            sink,
            batch: None,
        };
        (pipeline, receiver)
    }

    pub fn directory(&self) -> &Arc<UserDirectory> {
        &self.directory
    }

    pub fn is_batch_open(&self) -> bool {
        self.batch.is_some()
    }

    /// Start grouping submissions into one update of `container`
    pub fn begin_batch(&mut self, container: &str) -> Result<()> {
        if let Some(open) = &self.batch {
            warn!(open = %open.container, requested = container, "Save batch is already open");
            return Err(Error::BatchAlreadyOpen(open.container.clone()));
        }

        self.batch = Some(SaveBatch {
            container: container.to_string(),
            items: Vec::new(),
        });
        debug!(container, "Opened save batch");
        Ok(())
    }

    /// Queue `data` under `name`
    ///
    /// Inside a batch, `name` is the blob name. Otherwise it is split into
    /// `container/blob` and committed on its own right away.
    pub fn submit_blob(&mut self, name: &str, data: &[u8]) -> OperationId {
        let id = OperationId::next();
        let data = Bytes::copy_from_slice(data);

        match &mut self.batch {
            Some(batch) => {
                batch.items.push(PendingSave {
                    id,
                    name: name.to_string(),
                    data,
                });
                debug!(%id, blob = name, container = %batch.container, "Queued blob in batch");
            }
            None => {
                let (container, blob) = split_container_path(name);
                let item = PendingSave {
                    id,
                    name: blob.to_string(),
                    data,
                };
                self.commit(container.to_string(), vec![item]);
            }
        }
        id
    }

    /// Queue `size` bytes of `buffer` starting at `offset`
    ///
    /// The range must be non-empty and lie inside the buffer.
    pub fn submit_buffer(
        &mut self,
        buffer: &[u8],
        name: &str,
        offset: usize,
        size: usize,
    ) -> Result<OperationId> {
        let in_range = offset < buffer.len()
            && size >= 1
            && offset
                .checked_add(size)
                .is_some_and(|end| end <= buffer.len());
        if !in_range {
            return Err(Error::InvalidArgument(format!(
                "offset {} and size {} out of range for buffer of {} bytes",
                offset,
                size,
                buffer.len()
            )));
        }

        Ok(self.submit_blob(name, &buffer[offset..offset + size]))
    }

    /// Close the open batch and commit it
    ///
    /// Returns the number of blobs handed to the committer.
    pub fn end_batch(&mut self) -> Result<usize> {
        let batch = self.batch.take().ok_or(Error::NoBatchOpen)?;
        let count = batch.items.len();
        self.commit(batch.container, batch.items);
        Ok(count)
    }

    fn commit(&self, container: String, items: Vec<PendingSave>) {
        debug!(container = %container, items = items.len(), "Spawning save commit");
        // Fire and forget; outcomes arrive on the sink
        self.runtime.spawn(commit_batch(
            Arc::clone(&self.directory),
            container,
            items,
            self.sink.clone(),
        ));
    }
}

impl Drop for SavePipeline {
    fn drop(&mut self) {
        if let Some(batch) = &self.batch {
            warn!(
                container = %batch.container,
                items = batch.items.len(),
                "Save pipeline dropped with an open batch; blobs discarded"
            );
        }
    }
}

impl std::fmt::Debug for SavePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavePipeline")
            .field("directory", &self.directory)
            .field("batch", &self.batch)
            .finish()
    }
}
