//! Headless browser sessions over the DevTools protocol.
//!
//! Each load launches a browser, opens one page, waits for the network to
//! settle, captures a [`DomSnapshot`], and tears everything down again. The
//! launch strategy depends on the deployment environment: development drives
//! a locally installed browser, production a packaged serverless Chromium.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use webextract_shared::{BrowserConfig, Environment, Result, WebExtractError};

use crate::dom::DomSnapshot;
use crate::loader::PageLoader;

/// DOM capture script; returns a [`DomSnapshot`]-shaped object.
const SNAPSHOT_JS: &str = include_str!("snapshot.js");

/// Probe used to detect network idle: document state plus resource count.
const NETWORK_PROBE_JS: &str =
    "[document.readyState, performance.getEntriesByType('resource').length]";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

const LOCAL_ARGS: [&str; 1] = ["--disable-setuid-sandbox"];

/// Flags for a constrained serverless sandbox (single process, no GPU, small /dev/shm).
const SERVERLESS_ARGS: [&str; 9] = [
    "--disable-setuid-sandbox",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--no-zygote",
    "--single-process",
    "--no-first-run",
    "--disable-extensions",
    "--hide-scrollbars",
    "--mute-audio",
];

// ---------------------------------------------------------------------------
// Launch strategy
// ---------------------------------------------------------------------------

/// How to start the browser binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStrategy {
    /// A locally installed browser; auto-detected when no path is given.
    Local { executable: Option<PathBuf> },
    /// A packaged Chromium at a fixed path with a reduced flag set.
    Serverless { executable: PathBuf },
}

impl LaunchStrategy {
    pub fn for_environment(environment: Environment, config: &BrowserConfig) -> Self {
        match environment {
            Environment::Development => Self::Local {
                executable: config.executable_path.as_ref().map(PathBuf::from),
            },
            Environment::Production => Self::Serverless {
                executable: PathBuf::from(&config.serverless_executable_path),
            },
        }
    }

    fn args(&self) -> &'static [&'static str] {
        match self {
            Self::Local { .. } => &LOCAL_ARGS,
            Self::Serverless { .. } => &SERVERLESS_ARGS,
        }
    }

    fn browser_config(&self, request_timeout: Duration) -> Result<chromiumoxide::BrowserConfig> {
        let mut builder = chromiumoxide::BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(request_timeout)
            .args(self.args().iter().copied());

        let executable = match self {
            Self::Local { executable } => executable.as_ref(),
            Self::Serverless { executable } => Some(executable),
        };
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|e| WebExtractError::scrape(format!("invalid browser configuration: {e}")))
    }
}

// ---------------------------------------------------------------------------
// BrowserLoader
// ---------------------------------------------------------------------------

/// [`PageLoader`] backed by a fresh headless browser per load.
#[derive(Debug, Clone)]
pub struct BrowserLoader {
    strategy: LaunchStrategy,
    navigation_timeout: Duration,
    idle_window: Duration,
    idle_timeout: Duration,
}

impl BrowserLoader {
    pub fn new(environment: Environment, config: &BrowserConfig) -> Self {
        Self {
            strategy: LaunchStrategy::for_environment(environment, config),
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            idle_window: Duration::from_millis(config.idle_window_ms),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }

    pub fn strategy(&self) -> &LaunchStrategy {
        &self.strategy
    }
}

#[async_trait]
impl PageLoader for BrowserLoader {
    #[instrument(skip_all, fields(url = %url))]
    async fn load(&self, url: &Url) -> Result<DomSnapshot> {
        let mut session = BrowserSession::launch(&self.strategy, self.navigation_timeout).await?;
        let result = session.capture(url, self).await;
        session.close().await;
        result
    }
}

// ---------------------------------------------------------------------------
// BrowserSession
// ---------------------------------------------------------------------------

/// A running browser plus the task that drives its protocol handler.
///
/// Dropping the session (for example when the surrounding request is
/// cancelled) aborts the handler task and lets the browser process go.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(strategy: &LaunchStrategy, request_timeout: Duration) -> Result<Self> {
        let config = strategy.browser_config(request_timeout)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| WebExtractError::scrape(format!("failed to launch browser: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("CDP event handler error: {e}");
                    break;
                }
            }
        });

        debug!(?strategy, "browser launched");
        Ok(Self { browser, handler })
    }

    /// Open `url` in a new page and snapshot it. The page is closed on every path.
    async fn capture(&self, url: &Url, opts: &BrowserLoader) -> Result<DomSnapshot> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| WebExtractError::scrape(format!("failed to open page: {e}")))?;

        let result = snapshot_page(&page, url, opts).await;

        if let Err(e) = page.close().await {
            warn!(error = %e, "failed to close page");
        }
        result
    }

    async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "failed to close browser");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "failed to reap browser process");
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

async fn snapshot_page(page: &Page, url: &Url, opts: &BrowserLoader) -> Result<DomSnapshot> {
    let started = Instant::now();

    tokio::time::timeout(opts.navigation_timeout, page.goto(url.as_str()))
        .await
        .map_err(|_| {
            WebExtractError::scrape(format!(
                "navigation to {url} timed out after {}s",
                opts.navigation_timeout.as_secs()
            ))
        })?
        .map_err(|e| WebExtractError::scrape(format!("navigation to {url} failed: {e}")))?;

    wait_for_network_idle(page, opts.idle_window, opts.idle_timeout).await;

    let snapshot: DomSnapshot = page
        .evaluate(SNAPSHOT_JS)
        .await
        .map_err(|e| WebExtractError::scrape(format!("DOM capture failed: {e}")))?
        .into_value()
        .map_err(|e| WebExtractError::scrape(format!("DOM capture returned bad data: {e}")))?;

    info!(
        nodes = snapshot.nodes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "page captured"
    );
    Ok(snapshot)
}

/// Wait until the document is complete and no new resources have started
/// for `window`, giving up quietly after `limit`.
async fn wait_for_network_idle(page: &Page, window: Duration, limit: Duration) {
    let deadline = Instant::now() + limit;
    let mut last_count = None;
    let mut quiet_since = Instant::now();

    while Instant::now() < deadline {
        let probe = match page.evaluate(NETWORK_PROBE_JS).await {
            Ok(result) => result.into_value::<(String, u64)>().ok(),
            Err(e) => {
                debug!(error = %e, "network probe failed");
                None
            }
        };

        if let Some((state, count)) = probe {
            if last_count != Some(count) {
                last_count = Some(count);
                quiet_since = Instant::now();
            } else if state == "complete" && quiet_since.elapsed() >= window {
                return;
            }
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }

    debug!(limit_ms = limit.as_millis() as u64, "network did not settle, capturing anyway");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_uses_local_browser() {
        let config = BrowserConfig {
            executable_path: Some("/usr/bin/chromium".into()),
            ..BrowserConfig::default()
        };
        let strategy = LaunchStrategy::for_environment(Environment::Development, &config);
        assert_eq!(
            strategy,
            LaunchStrategy::Local {
                executable: Some(PathBuf::from("/usr/bin/chromium"))
            }
        );
        assert!(!strategy.args().contains(&"--single-process"));
    }

    #[test]
    fn production_uses_serverless_build() {
        let strategy =
            LaunchStrategy::for_environment(Environment::Production, &BrowserConfig::default());
        assert_eq!(
            strategy,
            LaunchStrategy::Serverless {
                executable: PathBuf::from("/opt/chromium/chromium")
            }
        );
        assert!(strategy.args().contains(&"--single-process"));
    }

    #[test]
    fn loader_reads_timeouts_from_config() {
        let config = BrowserConfig {
            navigation_timeout_secs: 12,
            idle_window_ms: 250,
            ..BrowserConfig::default()
        };
        let loader = BrowserLoader::new(Environment::Development, &config);
        assert_eq!(loader.navigation_timeout, Duration::from_secs(12));
        assert_eq!(loader.idle_window, Duration::from_millis(250));
    }

    #[test]
    fn snapshot_script_is_an_expression() {
        assert!(SNAPSHOT_JS.trim_start().starts_with("(() =>"));
        assert!(SNAPSHOT_JS.contains("meta_description"));
    }
}
