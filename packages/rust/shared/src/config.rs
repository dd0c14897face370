//! Application configuration for webextract.
//!
//! User config lives at `~/.webextract/webextract.toml`.
//! Secrets are read from environment variables named in the file, never the file itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WebExtractError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "webextract.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".webextract";

/// Environment variable overriding `[runtime] environment`.
pub const ENVIRONMENT_VAR: &str = "WEBEXTRACT_ENV";

// ---------------------------------------------------------------------------
// Config structs (matching webextract.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(default)]
    pub vector_index: VectorIndexConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Deployment environment; selects the browser launch strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = WebExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(WebExtractError::config(format!(
                "unknown environment '{other}', expected development or production"
            ))),
        }
    }
}

/// `[runtime]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub environment: Environment,
}

/// Which page loader backs the scrape stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    /// Headless browser over the DevTools protocol.
    #[default]
    Browser,
    /// Plain HTTP fetch, no script execution.
    Http,
}

/// `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub loader: LoaderKind,

    /// Local browser binary for development. Auto-detected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,

    /// Packaged Chromium used in production.
    #[serde(default = "default_serverless_executable")]
    pub serverless_executable_path: String,

    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Quiet period that counts as network idle.
    #[serde(default = "default_idle_window")]
    pub idle_window_ms: u64,

    /// Upper bound on waiting for network idle after load.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            loader: LoaderKind::default(),
            executable_path: None,
            serverless_executable_path: default_serverless_executable(),
            navigation_timeout_secs: default_navigation_timeout(),
            idle_window_ms: default_idle_window(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

fn default_serverless_executable() -> String {
    "/opt/chromium/chromium".into()
}
fn default_navigation_timeout() -> u64 {
    30
}
fn default_idle_window() -> u64 {
    500
}
fn default_idle_timeout() -> u64 {
    10
}

/// Which embedder produces vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Cohere,
    /// Local feature hashing; no network, lower recall.
    Hashing,
}

/// `[embeddings]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embed_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embed_model")]
    pub model: String,

    /// Texts per embedding request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_embed_key_env")]
    pub api_key_env: String,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            endpoint: default_embed_endpoint(),
            model: default_embed_model(),
            batch_size: default_batch_size(),
            api_key_env: default_embed_key_env(),
        }
    }
}

fn default_embed_endpoint() -> String {
    "https://api.cohere.com/v1/embed".into()
}
fn default_embed_model() -> String {
    "embed-multilingual-v3.0".into()
}
fn default_batch_size() -> usize {
    48
}
fn default_embed_key_env() -> String {
    "COHERE_API_KEY".into()
}

/// Vector index backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Upstash,
    /// Process-local index, lost on exit.
    Memory,
}

/// `[vector_index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,

    #[serde(default = "default_vector_url_env")]
    pub url_env: String,

    #[serde(default = "default_vector_token_env")]
    pub token_env: String,

    /// Env var holding the access token required to wipe the index.
    #[serde(default = "default_clear_token_env")]
    pub clear_token_env: String,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            url_env: default_vector_url_env(),
            token_env: default_vector_token_env(),
            clear_token_env: default_clear_token_env(),
        }
    }
}

fn default_vector_url_env() -> String {
    "UPSTASH_VECTOR_REST_URL".into()
}
fn default_vector_token_env() -> String {
    "UPSTASH_VECTOR_REST_TOKEN".into()
}
fn default_clear_token_env() -> String {
    "CLEAR_VECTOR_STORE_TOKEN".into()
}

/// Context cache backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Libsql,
    Upstash,
    Memory,
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// libSQL database file. Defaults to `~/.webextract/cache.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_redis_url_env")]
    pub url_env: String,

    #[serde(default = "default_redis_token_env")]
    pub token_env: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            path: None,
            ttl_secs: default_ttl(),
            url_env: default_redis_url_env(),
            token_env: default_redis_token_env(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}
fn default_redis_url_env() -> String {
    "UPSTASH_REDIS_REST_URL".into()
}
fn default_redis_token_env() -> String {
    "UPSTASH_REDIS_REST_TOKEN".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Passages returned by the similarity search.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_max_context")]
    pub max_context_chars: usize,

    /// Budget for the index to make fresh writes searchable. 0 skips the wait.
    #[serde(default = "default_index_settle")]
    pub index_settle_ms: u64,

    #[serde(default = "default_true")]
    pub group_scraping: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            max_context_chars: default_max_context(),
            index_settle_ms: default_index_settle(),
            group_scraping: true,
        }
    }
}

fn default_chunk_size() -> usize {
    2000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_top_k() -> usize {
    10
}
fn default_max_context() -> usize {
    15_000
}
fn default_index_settle() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}

/// `[limits]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,

    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_secs: default_rate_limit_window(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}
fn default_rate_limit_requests() -> u32 {
    10
}
fn default_rate_limit_window() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, derived from the file)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub max_context_chars: usize,
    pub index_settle: Duration,
    pub cache_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            chunk_size: config.pipeline.chunk_size,
            chunk_overlap: config.pipeline.chunk_overlap,
            top_k: config.pipeline.top_k,
            max_context_chars: config.pipeline.max_context_chars,
            index_settle: Duration::from_millis(config.pipeline.index_settle_ms),
            cache_ttl: Duration::from_secs(config.cache.ttl_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.webextract/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| WebExtractError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.webextract/webextract.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
///
/// `WEBEXTRACT_ENV`, when set, overrides the configured environment.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };

    if let Ok(env) = std::env::var(ENVIRONMENT_VAR) {
        config.runtime.environment = env.parse()?;
    }

    Ok(config)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| WebExtractError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| WebExtractError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| WebExtractError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| WebExtractError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| WebExtractError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a required secret from the environment variable `var_name`.
pub fn require_env(var_name: &str, purpose: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(WebExtractError::config(format!(
            "{purpose} not found. Set the {var_name} environment variable."
        ))),
    }
}
