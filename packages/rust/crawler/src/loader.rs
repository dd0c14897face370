//! The page-loading capability and the scrape step built on it.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, instrument};
use url::Url;

use webextract_shared::{Result, ScrapedContent, WebExtractError};

use crate::blocks::{extract_blocks, extract_groups};
use crate::dom::DomSnapshot;

/// Something that can turn a URL into a DOM snapshot.
#[async_trait]
pub trait PageLoader: Send + Sync {
    /// Navigate to `url` and capture its DOM. Any page or browser acquired
    /// for the load is released before this returns, on success or failure.
    async fn load(&self, url: &Url) -> Result<DomSnapshot>;
}

/// Load `url` and extract its content, grouped or flat.
///
/// Fails with a scrape error when the page yields no content blocks.
#[instrument(skip_all, fields(url = %url, grouped = grouped))]
pub async fn scrape(loader: &dyn PageLoader, url: &Url, grouped: bool) -> Result<ScrapedContent> {
    let snapshot = loader.load(url).await?;

    let content = if grouped {
        ScrapedContent::Grouped(extract_groups(&snapshot))
    } else {
        ScrapedContent::Flat(extract_blocks(&snapshot))
    };

    let blocks = content.block_count();
    if blocks == 0 {
        return Err(WebExtractError::scrape(format!(
            "no content extracted from {url}"
        )));
    }

    debug!(nodes = snapshot.nodes.len(), blocks, "extracted page content");
    Ok(content)
}

// ---------------------------------------------------------------------------
// StaticLoader
// ---------------------------------------------------------------------------

/// Serves pre-captured snapshots by URL.
#[derive(Debug, Default, Clone)]
pub struct StaticLoader {
    pages: HashMap<String, DomSnapshot>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register static HTML for `url`, parsed as the HTTP loader would.
    pub fn with_html(mut self, url: &Url, html: &str) -> Self {
        self.pages
            .insert(url.to_string(), DomSnapshot::from_html(html, Some(url)));
        self
    }

    pub fn with_snapshot(mut self, url: &Url, snapshot: DomSnapshot) -> Self {
        self.pages.insert(url.to_string(), snapshot);
        self
    }
}

#[async_trait]
impl PageLoader for StaticLoader {
    async fn load(&self, url: &Url) -> Result<DomSnapshot> {
        self.pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| WebExtractError::scrape(format!("navigation failed: {url} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://example.com/page").expect("url")
    }

    #[tokio::test]
    async fn scrape_flat_and_grouped() {
        let loader = StaticLoader::new().with_html(&url(), "<body><h2>A</h2><p>alpha</p></body>");

        let flat = scrape(&loader, &url(), false).await.expect("flat");
        assert!(matches!(flat, ScrapedContent::Flat(ref b) if b.len() == 2));

        let grouped = scrape(&loader, &url(), true).await.expect("grouped");
        assert!(matches!(grouped, ScrapedContent::Grouped(ref g) if g.len() == 1));
    }

    #[tokio::test]
    async fn empty_page_is_scrape_failure() {
        let loader = StaticLoader::new().with_html(&url(), "<body><nav>menu</nav></body>");
        let err = scrape(&loader, &url(), true).await.unwrap_err();
        assert_eq!(err.code(), "SCRAPE_FAILURE");
    }

    #[tokio::test]
    async fn unknown_url_is_scrape_failure() {
        let loader = StaticLoader::new();
        let err = scrape(&loader, &url(), false).await.unwrap_err();
        assert!(matches!(err, WebExtractError::Scrape { .. }));
    }
}
