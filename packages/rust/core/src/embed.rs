//! Chunk/embed step: render scraped content, split it into overlapping
//! chunks, and write them to the vector index.

use std::sync::Arc;

use tracing::{debug, instrument};
use uuid::Uuid;

use webextract_crawler::render_blocks;
use webextract_index::VectorIndex;
use webextract_shared::{DocumentMetadata, Result, ScrapedContent, VectorDocument};
use webextract_text::TextSplitter;

use crate::lease::DocumentLease;

/// Render and split `content` into documents tagged with `source`.
///
/// Grouped content yields one rendered text per group, each chunk carrying
/// its `group_id`. Flat content is rendered as a single document.
pub fn build_documents(
    content: &ScrapedContent,
    source: &str,
    splitter: &TextSplitter,
) -> Vec<VectorDocument> {
    let sections: Vec<(Option<&str>, String)> = match content {
        ScrapedContent::Grouped(groups) => groups
            .iter()
            .map(|group| (Some(group.group_id.as_str()), render_blocks(&group.blocks)))
            .collect(),
        ScrapedContent::Flat(blocks) => vec![(None, render_blocks(blocks))],
    };

    sections
        .into_iter()
        .flat_map(|(group_id, text)| {
            splitter
                .split(&text)
                .into_iter()
                .map(move |chunk| VectorDocument {
                    id: Uuid::new_v4().to_string(),
                    page_content: chunk,
                    metadata: DocumentMetadata {
                        source: source.to_string(),
                        group_id: group_id.map(str::to_string),
                    },
                })
        })
        .collect()
}

/// Store `content` in `index` as chunked documents in one batch.
///
/// The returned lease owns the generated ids. It is created before the write
/// so that a failed or cancelled write still deletes whatever was stored.
#[instrument(skip_all, fields(source = source))]
pub async fn embed_content(
    index: &Arc<dyn VectorIndex>,
    content: &ScrapedContent,
    source: &str,
    splitter: &TextSplitter,
) -> Result<DocumentLease> {
    let documents = build_documents(content, source, splitter);
    let lease = DocumentLease::new(
        Arc::clone(index),
        documents.iter().map(|d| d.id.clone()).collect(),
    );
    if documents.is_empty() {
        return Ok(lease);
    }

    match index.add_documents(&documents).await {
        Ok(_) => {
            debug!(documents = documents.len(), "stored chunks");
            Ok(lease)
        }
        Err(e) => {
            lease.release_quietly().await;
            Err(e)
        }
    }
}
