//! Process-local vector index with exact cosine-similarity search.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use webextract_shared::{Result, VectorDocument, WebExtractError};

use crate::VectorIndex;
use crate::embeddings::Embedder;

struct Entry {
    document: VectorDocument,
    vector: Vec<f32>,
}

/// In-memory index. Writes are searchable immediately.
pub struct MemoryVectorIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<Entry>>,
}

impl MemoryVectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.iter().any(|e| e.document.id == id)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn add_documents(&self, documents: &[VectorDocument]) -> Result<Vec<String>> {
        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != documents.len() {
            return Err(WebExtractError::Embedding(format!(
                "embedder returned {} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }

        let mut entries = self.entries.write().await;
        for (document, vector) in documents.iter().zip(vectors) {
            entries.retain(|e| e.document.id != document.id);
            entries.push(Entry {
                document: document.clone(),
                vector,
            });
        }
        Ok(documents.iter().map(|d| d.id.clone()).collect())
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        source: &str,
    ) -> Result<Vec<VectorDocument>> {
        let query = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| WebExtractError::Retrieval(e.to_string()))?;

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &Entry)> = entries
            .iter()
            .filter(|e| e.document.metadata.source == source)
            .map(|e| (cosine(&query, &e.vector), e))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, e)| e.document.clone())
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.entries
            .write()
            .await
            .retain(|e| !ids.contains(&e.document.id));
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn wait_until_searchable(&self, _budget: Duration) -> Result<()> {
        Ok(())
    }
}
