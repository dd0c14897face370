//! Page loading and content block extraction.
//!
//! This crate provides:
//! - [`dom`]: the serialized DOM snapshot both loaders produce
//! - [`blocks`]: classification of visible elements into content blocks, flat or grouped
//! - [`render`]: plain-text rendering of blocks for embedding
//! - [`PageLoader`] with a headless-browser ([`BrowserLoader`]) and a plain HTTP ([`HttpLoader`]) backend

pub mod blocks;
pub mod dom;
pub mod fetch;
pub mod loader;
pub mod render;
pub mod session;

pub use blocks::{extract_blocks, extract_groups};
pub use dom::{DomNode, DomSnapshot, DomTree, ElementNode, TextNode};
pub use fetch::{HttpLoader, is_internal_target};
pub use loader::{PageLoader, StaticLoader, scrape};
pub use render::{render_block, render_blocks};
pub use session::{BrowserLoader, LaunchStrategy};
