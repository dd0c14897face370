//! Service construction from configuration.
//!
//! Every external collaborator is built once here and shared as a trait
//! object, so tests and alternative deployments can substitute their own.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use webextract_crawler::{BrowserLoader, HttpLoader, PageLoader};
use webextract_index::{
    CohereEmbedder, Embedder, HashingEmbedder, MemoryVectorIndex, UpstashVectorIndex, VectorIndex,
};
use webextract_shared::{
    AppConfig, CacheBackend, EmbeddingProvider, IndexBackend, LoaderKind, PipelineConfig, Result,
    config_dir, require_env,
};
use webextract_storage::{ContextCache, MemoryCache, Storage, UpstashRedisCache};

use crate::pipeline::ContextPipeline;

/// Shared collaborators of the pipeline.
#[derive(Clone)]
pub struct ServiceDeps {
    pub loader: Arc<dyn PageLoader>,
    pub index: Arc<dyn VectorIndex>,
    pub cache: Arc<dyn ContextCache>,
}

impl ServiceDeps {
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            loader: build_loader(config)?,
            index: build_index(config)?,
            cache: build_cache(config).await?,
        })
    }

    pub fn pipeline(&self, config: &AppConfig) -> Result<ContextPipeline> {
        ContextPipeline::new(
            Arc::clone(&self.loader),
            Arc::clone(&self.index),
            Arc::clone(&self.cache),
            PipelineConfig::from(config),
        )
    }
}

pub fn build_loader(config: &AppConfig) -> Result<Arc<dyn PageLoader>> {
    match config.browser.loader {
        LoaderKind::Browser => Ok(Arc::new(BrowserLoader::new(
            config.runtime.environment,
            &config.browser,
        ))),
        LoaderKind::Http => Ok(Arc::new(HttpLoader::new(Duration::from_secs(
            config.browser.navigation_timeout_secs,
        ))?)),
    }
}

pub fn build_embedder(config: &AppConfig) -> Result<Arc<dyn Embedder>> {
    match config.embeddings.provider {
        EmbeddingProvider::Cohere => {
            let api_key = require_env(&config.embeddings.api_key_env, "Embeddings API key")?;
            Ok(Arc::new(CohereEmbedder::new(&config.embeddings, api_key)?))
        }
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::default())),
    }
}

pub fn build_index(config: &AppConfig) -> Result<Arc<dyn VectorIndex>> {
    let embedder = build_embedder(config)?;
    match config.vector_index.backend {
        IndexBackend::Upstash => {
            let url = require_env(&config.vector_index.url_env, "Vector index URL")?;
            let token = require_env(&config.vector_index.token_env, "Vector index token")?;
            Ok(Arc::new(UpstashVectorIndex::new(&url, token, embedder)?))
        }
        IndexBackend::Memory => Ok(Arc::new(MemoryVectorIndex::new(embedder))),
    }
}

pub async fn build_cache(config: &AppConfig) -> Result<Arc<dyn ContextCache>> {
    match config.cache.backend {
        CacheBackend::Libsql => Ok(Arc::new(open_storage(config).await?)),
        CacheBackend::Upstash => {
            let url = require_env(&config.cache.url_env, "Cache URL")?;
            let token = require_env(&config.cache.token_env, "Cache token")?;
            Ok(Arc::new(UpstashRedisCache::new(&url, token)?))
        }
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
    }
}

/// Open the libSQL cache database named by the config.
pub async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let path = match &config.cache.path {
        Some(path) => PathBuf::from(path),
        None => config_dir()?.join("cache.db"),
    };
    debug!(?path, "opening cache database");
    Storage::open(&path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.browser.loader = LoaderKind::Http;
        config.embeddings.provider = EmbeddingProvider::Hashing;
        config.vector_index.backend = IndexBackend::Memory;
        config.cache.backend = CacheBackend::Memory;
        config
    }

    #[tokio::test]
    async fn offline_stack_builds() {
        let config = offline_config();
        let deps = ServiceDeps::from_config(&config).await.expect("deps");
        deps.pipeline(&config).expect("pipeline");
    }

    #[tokio::test]
    async fn libsql_cache_opens_configured_path() {
        let mut config = offline_config();
        config.cache.backend = CacheBackend::Libsql;
        let path = std::env::temp_dir().join(format!("wx_deps_{}.db", Uuid::now_v7()));
        config.cache.path = Some(path.display().to_string());

        let cache = build_cache(&config).await.expect("cache");
        cache
            .set("k", "v", Duration::from_secs(60))
            .await
            .expect("set");
        assert!(path.exists());
    }

    #[test]
    fn upstash_index_requires_credentials() {
        let mut config = offline_config();
        config.vector_index.backend = IndexBackend::Upstash;
        config.vector_index.url_env = "WEBEXTRACT_TEST_UNSET_VECTOR_URL".into();
        let err = build_index(&config).err().expect("missing env");
        assert!(err.to_string().contains("WEBEXTRACT_TEST_UNSET_VECTOR_URL"));
    }
}
