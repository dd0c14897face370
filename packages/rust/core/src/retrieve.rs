//! Retrieval and context assembly.

use tracing::{debug, instrument};

use webextract_index::VectorIndex;
use webextract_shared::{Attribute, Result};
use webextract_text::{normalize_whitespace, truncate_chars};

/// Separator between retrieved passages.
const PASSAGE_SEPARATOR: &str = "\n\n";

/// Similarity query for a template: `"name: description"` per attribute,
/// in declaration order.
pub fn build_query(attributes: &[Attribute]) -> String {
    attributes
        .iter()
        .map(|a| format!("{}: {}", a.name, a.description))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Search `index` for passages from `source` relevant to `attributes` and
/// concatenate them in rank order.
#[instrument(skip_all, fields(source = source, k = top_k))]
pub async fn retrieve(
    index: &dyn VectorIndex,
    source: &str,
    attributes: &[Attribute],
    top_k: usize,
) -> Result<String> {
    let query = build_query(attributes);
    let passages = index.similarity_search(&query, top_k, source).await?;
    debug!(passages = passages.len(), "retrieved passages");

    Ok(passages
        .iter()
        .map(|d| d.page_content.as_str())
        .collect::<Vec<_>>()
        .join(PASSAGE_SEPARATOR))
}

/// Collapse whitespace and cut to at most `max_chars` characters.
pub fn post_process(raw: &str, max_chars: usize) -> String {
    truncate_chars(&normalize_whitespace(raw), max_chars).to_string()
}
