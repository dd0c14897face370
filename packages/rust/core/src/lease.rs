//! Scoped ownership of transient vector documents.

use std::sync::Arc;

use tracing::{debug, warn};

use webextract_index::VectorIndex;
use webextract_shared::Result;

/// Deletes its documents from the index when released or dropped.
///
/// Dropping an unreleased lease inside a tokio runtime spawns the delete in
/// the background, which covers cancellation by a timeout.
pub struct DocumentLease {
    index: Arc<dyn VectorIndex>,
    ids: Vec<String>,
}

impl DocumentLease {
    pub fn new(index: Arc<dyn VectorIndex>, ids: Vec<String>) -> Self {
        Self { index, ids }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Give up ownership without deleting anything.
    pub fn keep(mut self) -> Vec<String> {
        std::mem::take(&mut self.ids)
    }

    /// Delete the documents now.
    pub async fn release(mut self) -> Result<()> {
        let ids = std::mem::take(&mut self.ids);
        if ids.is_empty() {
            return Ok(());
        }
        self.index.delete(&ids).await?;
        debug!(documents = ids.len(), "deleted transient documents");
        Ok(())
    }

    /// Delete the documents now, logging instead of returning a failure.
    pub async fn release_quietly(self) {
        let count = self.ids.len();
        if let Err(e) = self.release().await {
            warn!(documents = count, error = %e, "failed to delete transient documents");
        }
    }
}

impl Drop for DocumentLease {
    fn drop(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        let ids = std::mem::take(&mut self.ids);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let index = Arc::clone(&self.index);
                handle.spawn(async move {
                    if let Err(e) = index.delete(&ids).await {
                        warn!(documents = ids.len(), error = %e, "background delete failed");
                    }
                });
            }
            Err(_) => warn!(documents = ids.len(), "no runtime, documents left in index"),
        }
    }
}
