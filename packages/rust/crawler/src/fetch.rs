//! Plain HTTP page loader with SSRF protection.
//!
//! Fetches HTML without executing scripts and parses it into the same
//! snapshot shape the browser produces.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::{Host, Url};

use webextract_shared::{Result, WebExtractError};

use crate::dom::DomSnapshot;
use crate::loader::PageLoader;

/// User-Agent string for page requests.
const USER_AGENT: &str = concat!("webextract/", env!("CARGO_PKG_VERSION"));

/// Fetches pages over HTTP.
pub struct HttpLoader {
    client: Client,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl HttpLoader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| WebExtractError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            allow_localhost: false,
        })
    }

    /// Allow fetching localhost/private IPs (for integration tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }
}

#[async_trait]
impl PageLoader for HttpLoader {
    #[instrument(skip_all, fields(url = %url))]
    async fn load(&self, url: &Url) -> Result<DomSnapshot> {
        if !self.allow_localhost && is_internal_target(url) {
            warn!(%url, "SSRF protection: blocked");
            return Err(WebExtractError::scrape(format!(
                "refusing to fetch internal address {url}"
            )));
        }

        debug!("fetching page");
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| WebExtractError::scrape(format!("navigation to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebExtractError::scrape(format!("{url}: HTTP {status}")));
        }

        // Relative links resolve against the final URL after redirects.
        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| WebExtractError::scrape(format!("{url}: body read failed: {e}")))?;

        Ok(DomSnapshot::from_html(&body, Some(&final_url)))
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Whether a URL targets a non-HTTP scheme or a loopback, private,
/// link-local, or otherwise internal host.
pub fn is_internal_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(Host::Domain(host)) => {
            let host = host.to_ascii_lowercase();
            host == "localhost"
                || host.ends_with(".localhost")
                || host.ends_with(".local")
                || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(&IpAddr::V4(v4)))
        }
    }
}
