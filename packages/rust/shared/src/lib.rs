//! Shared types, error model, and configuration for webextract.
//!
//! This crate is the foundation depended on by all other webextract crates.
//! It provides:
//! - [`WebExtractError`], the unified error type
//! - Domain types ([`ContentBlock`], [`ContentGroup`], [`ContextRequest`], [`VectorDocument`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrowserConfig, CacheBackend, CacheConfig, EmbeddingProvider, EmbeddingsConfig,
    Environment,
    IndexBackend, LimitsConfig, LoaderKind, PipelineConfig, PipelineSettings, RuntimeConfig,
    VectorIndexConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    require_env,
};
pub use error::{FieldError, Result, WebExtractError};
pub use types::{
    ArrayItems, Attribute, AttributeKind, ContentBlock, ContentGroup, ContextOutput,
    ContextRequest, DocumentMetadata, META_GROUP_ID, ScrapedContent, SimpleAttribute, ValueType,
    VectorDocument, format_elapsed,
};
