//! Upstash Redis REST backend.
//!
//! Commands are sent as JSON arrays (`["GET", key]`) to the database URL and
//! answered with `{"result": ...}` or `{"error": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use webextract_shared::{Result, WebExtractError};

use crate::ContextCache;

const USER_AGENT: &str = concat!("webextract/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Client for an Upstash Redis database.
pub struct UpstashRedisCache {
    client: Client,
    url: String,
    token: String,
}

impl UpstashRedisCache {
    pub fn new(url: &str, token: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WebExtractError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn command(&self, args: Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await
            .map_err(|e| WebExtractError::Cache(e.to_string()))?;

        let status = response.status();
        let reply: Reply = response
            .json()
            .await
            .map_err(|e| WebExtractError::Cache(format!("HTTP {status}: unexpected response: {e}")))?;

        match reply.error {
            Some(error) => Err(WebExtractError::Cache(error)),
            None if !status.is_success() => Err(WebExtractError::Cache(format!("HTTP {status}"))),
            None => Ok(reply.result),
        }
    }
}

#[async_trait]
impl ContextCache for UpstashRedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.command(json!(["GET", key])).await? {
            Value::Null => Ok(None),
            Value::String(value) => Ok(Some(value)),
            other => Err(WebExtractError::Cache(format!(
                "unexpected GET result: {other}"
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        // Redis rejects a zero expiry; an entry that is already stale is not written.
        let ttl_ms = ttl.as_millis();
        if ttl_ms == 0 {
            debug!(key, "skipping cache write with zero ttl");
            return Ok(());
        }
        self.command(json!(["SET", key, value, "PX", ttl_ms as u64]))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_hit_and_miss() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer tok"))
            .and(body_json(json!(["GET", "hit"])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "ctx"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_json(json!(["GET", "miss"])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": null})))
            .mount(&server)
            .await;

        let cache = UpstashRedisCache::new(&server.uri(), "tok".into()).expect("client");
        assert_eq!(cache.get("hit").await.expect("get").as_deref(), Some("ctx"));
        assert!(cache.get("miss").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn set_sends_expiry_in_millis() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!(["SET", "k", "v", "PX", 3_600_000])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "OK"})))
            .expect(1)
            .mount(&server)
            .await;

        let cache = UpstashRedisCache::new(&server.uri(), "tok".into()).expect("client");
        cache
            .set("k", "v", Duration::from_secs(3600))
            .await
            .expect("set");
    }

    #[tokio::test]
    async fn error_reply_is_cache_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"error": "Unauthorized"})),
            )
            .mount(&server)
            .await;

        let cache = UpstashRedisCache::new(&server.uri(), "bad".into()).expect("client");
        let err = cache.get("k").await.expect_err("should fail");
        assert_eq!(err.code(), "CACHE_FAILURE");
        assert!(err.to_string().contains("Unauthorized"));
    }
}
