//! Context assembly and extraction orchestration for webextract.
//!
//! This crate ties the crawler, text, index, and storage crates together:
//! - [`ContextPipeline::get_context`]: cache → scrape → embed → retrieve → cache
//! - [`ExtractService`]: the per-request handler around it (rate limit,
//!   validation, timeout, model call, document cleanup)
//! - [`ServiceDeps`]: collaborator construction from [`AppConfig`](webextract_shared::AppConfig)

pub mod deps;
pub mod embed;
pub mod extract;
pub mod inflight;
pub mod lease;
pub mod pipeline;
pub mod rate_limit;
pub mod retrieve;
pub mod validate;

pub use deps::{ServiceDeps, build_cache, build_embedder, build_index, build_loader, open_storage};
pub use embed::{build_documents, embed_content};
pub use extract::{ExtractFailure, ExtractResponse, ExtractService, ExtractionModel};
pub use inflight::InflightRegistry;
pub use lease::DocumentLease;
pub use pipeline::ContextPipeline;
pub use rate_limit::FixedWindowLimiter;
pub use retrieve::{build_query, post_process, retrieve};
pub use validate::validate_request;
