//! Text utilities shared by the extractor and the context pipeline.
//!
//! - [`truncate_with_ellipsis`] bounds individual block fields
//! - [`normalize_whitespace`] and [`truncate_chars`] post-process assembled context
//! - [`TextSplitter`] cuts rendered content into overlapping chunks for embedding

mod cleanup;
mod splitter;

pub use cleanup::{normalize_whitespace, truncate_chars, truncate_with_ellipsis};
pub use splitter::TextSplitter;
