//! The `get_context` orchestrator: cache → scrape → embed → settle →
//! retrieve → post-process → cache write.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use url::Url;

use webextract_crawler::{PageLoader, scrape};
use webextract_index::VectorIndex;
use webextract_shared::{
    ContextOutput, ContextRequest, PipelineConfig, Result, WebExtractError, format_elapsed,
};
use webextract_storage::ContextCache;
use webextract_text::TextSplitter;

use crate::embed::embed_content;
use crate::inflight::InflightRegistry;
use crate::retrieve::{post_process, retrieve};

/// Assembles retrieval context for extraction requests.
///
/// Collaborators are injected once and shared by all requests.
pub struct ContextPipeline {
    loader: Arc<dyn PageLoader>,
    index: Arc<dyn VectorIndex>,
    cache: Arc<dyn ContextCache>,
    splitter: TextSplitter,
    config: PipelineConfig,
    inflight: InflightRegistry<ContextOutput>,
}

impl ContextPipeline {
    pub fn new(
        loader: Arc<dyn PageLoader>,
        index: Arc<dyn VectorIndex>,
        cache: Arc<dyn ContextCache>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)?;
        Ok(Self {
            loader,
            index,
            cache,
            splitter,
            config,
            inflight: InflightRegistry::new(),
        })
    }

    /// The index transient documents are written to.
    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Produce the context for `request`.
    ///
    /// A fresh cache entry is returned as is, with zero timings, unless
    /// `ignore_cache` is set. Cache failures are logged and skipped.
    /// The documents listed in the output are left in the index for the
    /// caller to delete; on failure this method deletes them itself.
    #[instrument(skip_all, fields(cache_key = %request.cache_key()))]
    pub async fn get_context(&self, request: &ContextRequest) -> Result<ContextOutput> {
        let key = request.cache_key();

        if request.ignore_cache {
            debug!("cache bypass requested");
        } else {
            let lookup = Instant::now();
            match self.cache.get(&key).await {
                Ok(Some(context)) if !context.is_empty() => {
                    info!(
                        elapsed_ms = lookup.elapsed().as_millis() as u64,
                        "serving cached context"
                    );
                    return Ok(ContextOutput::cached(context));
                }
                Ok(_) => debug!("cache miss"),
                Err(e) => warn!(error = %e, "cache read failed, running full pipeline"),
            }
        }

        self.inflight.run(&key, || self.run(request, &key)).await
    }

    async fn run(&self, request: &ContextRequest, key: &str) -> Result<ContextOutput> {
        let url = Url::parse(&request.url)
            .map_err(|e| WebExtractError::validation(format!("invalid URL {}: {e}", request.url)))?;
        let start = Instant::now();

        // --- Scrape ---
        let content = scrape(self.loader.as_ref(), &url, request.is_group_scraping).await?;
        let scrape_time = start.elapsed();

        // --- Embed ---
        let embed_start = Instant::now();
        let lease = embed_content(&self.index, &content, &request.url, &self.splitter).await?;
        let embed_ms = embed_start.elapsed().as_millis() as u64;

        // --- Settle ---
        let settle_start = Instant::now();
        if let Err(e) = self.index.wait_until_searchable(self.config.index_settle).await {
            lease.release_quietly().await;
            return Err(e);
        }
        let settle_ms = settle_start.elapsed().as_millis() as u64;

        // --- Retrieve ---
        let retrieve_start = Instant::now();
        let raw = match retrieve(
            self.index.as_ref(),
            &request.url,
            &request.attributes,
            self.config.top_k,
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                lease.release_quietly().await;
                return Err(e);
            }
        };
        let retrieve_ms = retrieve_start.elapsed().as_millis() as u64;

        let context = post_process(&raw, self.config.max_context_chars);
        let embedding_time = embed_start.elapsed();

        // --- Cache write ---
        if context.is_empty() {
            debug!("retrieval found nothing, context not cached");
        } else if let Err(e) = self.cache.set(key, &context, self.config.cache_ttl).await {
            warn!(error = %e, "cache write failed");
        }

        info!(
            scrape_ms = scrape_time.as_millis() as u64,
            embed_ms,
            settle_ms,
            retrieve_ms,
            total_ms = start.elapsed().as_millis() as u64,
            blocks = content.block_count(),
            documents = lease.ids().len(),
            context_chars = context.chars().count(),
            "context assembled"
        );

        Ok(ContextOutput {
            scrape_execution_time: format_elapsed(scrape_time),
            embedding_time: format_elapsed(embedding_time),
            context,
            stored_document_ids: lease.keep(),
        })
    }
}
