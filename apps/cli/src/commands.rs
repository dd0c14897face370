//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use webextract_core::{DocumentLease, ServiceDeps, build_index, open_storage, validate_request};
use webextract_index::VectorIndex;
use webextract_shared::{
    AppConfig, CacheBackend, ContextRequest, init_config, load_config, require_env,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// webextract: assemble page context for structured extraction.
#[derive(Parser)]
#[command(
    name = "webextract",
    version,
    about = "Scrape a page, embed its content, and retrieve the context relevant to a template.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Assemble context for a template and print it as JSON.
    Context {
        /// Template file: `{"id", "url", "attributes": [...]}`.
        #[arg(short, long)]
        template: PathBuf,

        /// Skip the cache lookup and rebuild the context.
        #[arg(long)]
        ignore_cache: bool,

        /// Extract blocks without grouping them by section.
        #[arg(long)]
        flat: bool,

        /// Leave the embedded chunks in the vector index.
        #[arg(long)]
        keep_documents: bool,
    },

    /// Vector store administration.
    #[command(name = "vectorstore")]
    VectorStore {
        #[command(subcommand)]
        action: VectorStoreAction,
    },

    /// Context cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Vector store subcommands.
#[derive(Subcommand)]
pub(crate) enum VectorStoreAction {
    /// Delete every document in the vector index.
    Clear {
        /// Access token; must match the configured clear-token variable.
        #[arg(long)]
        token: String,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Delete expired entries from the local cache database.
    Purge,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "webextract=info",
        1 => "webextract=debug",
        _ => "webextract=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Context {
            template,
            ignore_cache,
            flat,
            keep_documents,
        } => cmd_context(&template, ignore_cache, flat, keep_documents).await,
        Command::VectorStore { action } => match action {
            VectorStoreAction::Clear { token } => cmd_vectorstore_clear(&token).await,
        },
        Command::Cache { action } => match action {
            CacheAction::Purge => cmd_cache_purge().await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_context(
    template: &Path,
    ignore_cache: bool,
    flat: bool,
    keep_documents: bool,
) -> Result<()> {
    let config = load_config()?;

    let raw = std::fs::read_to_string(template)
        .wrap_err_with(|| format!("failed to read template {}", template.display()))?;
    let mut request: ContextRequest = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("invalid template {}", template.display()))?;
    request.ignore_cache |= ignore_cache;
    request.is_group_scraping = request.is_group_scraping && config.pipeline.group_scraping && !flat;
    validate_request(&request)?;

    let deps = ServiceDeps::from_config(&config).await?;
    let pipeline = deps.pipeline(&config)?;

    let spinner = spinner(format!("Assembling context for {}", request.url))?;
    let outcome = pipeline.get_context(&request).await;
    spinner.finish_and_clear();
    let output = outcome?;

    let lease = DocumentLease::new(deps.index.clone(), output.stored_document_ids.clone());
    if keep_documents {
        lease.keep();
    } else {
        lease.release().await?;
    }

    info!(
        scrape = %output.scrape_execution_time,
        embedding = %output.embedding_time,
        documents = output.stored_document_ids.len(),
        "context ready"
    );
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_vectorstore_clear(token: &str) -> Result<()> {
    let config = load_config()?;
    check_clear_token(&config, token)?;

    let index = build_index(&config)?;
    let spinner = spinner("Clearing vector store".to_string())?;
    let outcome = index.delete_all().await;
    spinner.finish_and_clear();
    outcome?;

    println!("Vector store cleared.");
    Ok(())
}

fn check_clear_token(config: &AppConfig, token: &str) -> Result<()> {
    let expected = require_env(&config.vector_index.clear_token_env, "Vector store access token")?;
    if token != expected {
        return Err(eyre!("invalid access token"));
    }
    Ok(())
}

async fn cmd_cache_purge() -> Result<()> {
    let config = load_config()?;
    if config.cache.backend != CacheBackend::Libsql {
        println!(
            "Nothing to purge: the {:?} cache backend expires entries itself.",
            config.cache.backend
        );
        return Ok(());
    }

    let storage = open_storage(&config).await?;
    let removed = storage.purge_expired().await?;
    println!("Removed {removed} expired cache entr{}.", if removed == 1 { "y" } else { "ies" });
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

fn spinner(message: String) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}
