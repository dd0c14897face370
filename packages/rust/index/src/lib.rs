//! Embeddings and vector index backends.
//!
//! This crate provides:
//! - [`Embedder`] with [`CohereEmbedder`] and [`HashingEmbedder`]
//! - [`VectorIndex`], the store the pipeline writes chunks to and searches
//! - [`UpstashVectorIndex`] (REST) and [`MemoryVectorIndex`] (process-local)

use std::time::Duration;

use async_trait::async_trait;

use webextract_shared::{Result, VectorDocument};

pub mod embeddings;
pub mod memory;
pub mod upstash;

pub use embeddings::{CohereEmbedder, Embedder, HashingEmbedder};
pub use memory::MemoryVectorIndex;
pub use upstash::UpstashVectorIndex;

/// A similarity-searchable document store.
///
/// Write failures surface as embedding errors, query failures as retrieval
/// errors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed and store documents under their own ids. Returns the stored ids
    /// in input order.
    async fn add_documents(&self, documents: &[VectorDocument]) -> Result<Vec<String>>;

    /// Top-`k` documents most similar to `query` whose metadata `source`
    /// equals `source`, best first.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        source: &str,
    ) -> Result<Vec<VectorDocument>>;

    /// Delete documents by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Delete every document in the index.
    async fn delete_all(&self) -> Result<()>;

    /// Wait, at most `budget`, until recent writes are visible to search.
    ///
    /// The default sleeps for the whole budget, for stores that offer no
    /// way to observe indexing progress.
    async fn wait_until_searchable(&self, budget: Duration) -> Result<()> {
        if !budget.is_zero() {
            tokio::time::sleep(budget).await;
        }
        Ok(())
    }
}
