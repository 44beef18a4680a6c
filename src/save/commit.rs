//! Background batch commit
//!
//! Runs on its own task: storage setup has to be polled, and some provider
//! calls are too slow for the caller's thread. Every item handed in gets
//! exactly one outcome.

use super::error::SaveError;
use super::outcome::{OperationId, OutcomeSink};
use super::pipeline::PendingSave;
use super::users::UserDirectory;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

fn fail_all(items: &[PendingSave], err: SaveError, sink: &OutcomeSink) {
    for item in items {
        sink.report(item.id, Err(err));
    }
}

/// Write `items` into `container` as a single update
#[instrument(skip(directory, items, sink), fields(items = items.len()))]
pub(crate) async fn commit_batch(
    directory: Arc<UserDirectory>,
    container: String,
    items: Vec<PendingSave>,
    sink: OutcomeSink,
) {
    let storage = match directory.resolve_storage().await {
        Ok(storage) => storage,
        Err(err) => {
            error!(%err, "Unable to resolve save storage");
            fail_all(&items, err, &sink);
            return;
        }
    };

    let mut container_handle = match storage.provider().create_container(&container).await {
        Ok(handle) => handle,
        Err(code) => {
            error!(%code, "Create container failed");
            fail_all(&items, SaveError::classify(code), &sink);
            return;
        }
    };

    let mut update = match container_handle.create_update(&container).await {
        Ok(update) => update,
        Err(code) => {
            error!(%code, "Create update failed");
            fail_all(&items, SaveError::classify(code), &sink);
            return;
        }
    };

    let mut survivors: Vec<OperationId> = Vec::with_capacity(items.len());
    for item in &items {
        match update.submit_blob_write(&item.name, &item.data) {
            Ok(()) => survivors.push(item.id),
            Err(code) => {
                warn!(id = %item.id, blob = %item.name, %code, "Blob write failed");
                sink.report(item.id, Err(SaveError::classify(code)));
            }
        }
    }

    if !survivors.is_empty() {
        let result = update.submit().await.map_err(SaveError::classify);
        match &result {
            Ok(()) => debug!(written = survivors.len(), "Update submitted"),
            Err(err) => error!(%err, "Submit update failed"),
        }
        for id in survivors {
            sink.report(id, result);
        }
    }

    // Release in reverse order of acquisition
    drop(update);
    drop(container_handle);
    drop(storage);
}
