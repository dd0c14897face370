//! The extraction request handler: rate limit, validate, assemble context,
//! call the model, and clean up, all under one wall-clock budget.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use webextract_shared::{
    AppConfig, Attribute, ContextRequest, Environment, Result, WebExtractError, format_elapsed,
};

use crate::lease::DocumentLease;
use crate::pipeline::ContextPipeline;
use crate::rate_limit::FixedWindowLimiter;
use crate::validate::validate_request;

/// The language-model collaborator that turns context into an answer.
#[async_trait]
pub trait ExtractionModel: Send + Sync {
    /// Produce a JSON object with one key per attribute, grounded in `context`.
    async fn extract(&self, context: &str, attributes: &[Attribute]) -> Result<Value>;
}

/// Successful extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    pub answer: Value,
    pub context: String,
    pub scrape_execution_time: String,
    pub embedding_time: String,
    pub llm_processing_time: String,
    pub stored_document_ids: Vec<String>,
}

/// Failed extraction with the time spent before failing.
#[derive(Debug, thiserror::Error)]
#[error("{error} (after {processing_time})")]
pub struct ExtractFailure {
    #[source]
    pub error: WebExtractError,
    pub processing_time: String,
}

/// Runs extraction requests end to end.
pub struct ExtractService {
    pipeline: Arc<ContextPipeline>,
    model: Arc<dyn ExtractionModel>,
    limiter: Option<FixedWindowLimiter>,
    timeout: Duration,
}

impl ExtractService {
    pub fn new(
        pipeline: Arc<ContextPipeline>,
        model: Arc<dyn ExtractionModel>,
        limiter: Option<FixedWindowLimiter>,
        timeout: Duration,
    ) -> Self {
        Self {
            pipeline,
            model,
            limiter,
            timeout,
        }
    }

    /// Build from configuration. Rate limiting is off in development.
    pub fn from_config(
        pipeline: Arc<ContextPipeline>,
        model: Arc<dyn ExtractionModel>,
        config: &AppConfig,
    ) -> Self {
        let limiter = match config.runtime.environment {
            Environment::Development => None,
            Environment::Production => Some(FixedWindowLimiter::from_config(&config.limits)),
        };
        Self::new(
            pipeline,
            model,
            limiter,
            Duration::from_secs(config.limits.request_timeout_secs),
        )
    }

    /// Handle one request from `caller` (the rate-limit identity).
    #[instrument(skip_all, fields(caller = caller, template = %request.id))]
    pub async fn handle(
        &self,
        caller: &str,
        request: &ContextRequest,
    ) -> std::result::Result<ExtractResponse, ExtractFailure> {
        let start = Instant::now();
        let outcome = self.process(caller, request).await;
        let processing_time = format_elapsed(start.elapsed());

        match outcome {
            Ok(response) => {
                info!(%processing_time, "extraction complete");
                Ok(response)
            }
            Err(error) => {
                warn!(code = error.code(), error = %error, %processing_time, "extraction failed");
                Err(ExtractFailure {
                    error,
                    processing_time,
                })
            }
        }
    }

    async fn process(&self, caller: &str, request: &ContextRequest) -> Result<ExtractResponse> {
        if let Some(limiter) = &self.limiter {
            limiter.check(caller)?;
        }
        validate_request(request)?;

        let start = Instant::now();
        match tokio::time::timeout(self.timeout, self.answer(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(WebExtractError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
        }
    }

    async fn answer(&self, request: &ContextRequest) -> Result<ExtractResponse> {
        let output = self.pipeline.get_context(request).await?;
        let lease = DocumentLease::new(
            Arc::clone(self.pipeline.index()),
            output.stored_document_ids.clone(),
        );

        let llm_start = Instant::now();
        let answer = self.model.extract(&output.context, &request.attributes).await;
        let llm_processing_time = format_elapsed(llm_start.elapsed());
        lease.release_quietly().await;

        Ok(ExtractResponse {
            answer: answer?,
            context: output.context,
            scrape_execution_time: output.scrape_execution_time,
            embedding_time: output.embedding_time,
            llm_processing_time,
            stored_document_ids: output.stored_document_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use webextract_index::MemoryVectorIndex;
    use webextract_storage::MemoryCache;

    use crate::pipeline::tests::{CountingLoader, config, memory_index, request};

    /// Answers whether the context mentions the title, after `delay`.
    struct FakeModel {
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl ExtractionModel for FakeModel {
        async fn extract(&self, context: &str, _attributes: &[Attribute]) -> Result<Value> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(WebExtractError::Model("provider returned 500".into()));
            }
            Ok(json!({ "title": context.contains("Title") }))
        }
    }

    struct Harness {
        service: ExtractService,
        index: Arc<MemoryVectorIndex>,
        loader: Arc<CountingLoader>,
    }

    fn harness(model: FakeModel, limiter: Option<FixedWindowLimiter>) -> Harness {
        let index = memory_index();
        let loader = Arc::new(CountingLoader::new(Duration::ZERO));
        let pipeline = ContextPipeline::new(
            loader.clone(),
            index.clone(),
            Arc::new(MemoryCache::new()),
            config(),
        )
        .expect("pipeline");
        let service = ExtractService::new(
            Arc::new(pipeline),
            Arc::new(model),
            limiter,
            Duration::from_secs(30),
        );
        Harness {
            service,
            index,
            loader,
        }
    }

    async fn settle(index: &MemoryVectorIndex) {
        for _ in 0..10 {
            if index.is_empty().await {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn success_returns_answer_and_deletes_documents() {
        let h = harness(
            FakeModel {
                delay: Duration::ZERO,
                fail: false,
            },
            None,
        );

        let response = h.service.handle("tester", &request()).await.expect("response");
        assert_eq!(response.answer, json!({ "title": true }));
        assert!(!response.stored_document_ids.is_empty());
        assert!(response.llm_processing_time.ends_with(" ms"));
        assert!(h.index.is_empty().await);

        let body = serde_json::to_value(&response).expect("json");
        assert!(body.get("scrapeExecutionTime").is_some());
        assert!(body.get("storedDocumentIds").is_some());
    }

    #[tokio::test]
    async fn model_failure_still_deletes_documents() {
        let h = harness(
            FakeModel {
                delay: Duration::ZERO,
                fail: true,
            },
            None,
        );

        let failure = h.service.handle("tester", &request()).await.unwrap_err();
        assert_eq!(failure.error.code(), "MODEL_FAILURE");
        assert!(failure.processing_time.ends_with(" ms"));
        assert!(h.index.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_and_cleans_up() {
        let h = harness(
            FakeModel {
                delay: Duration::from_secs(60),
                fail: false,
            },
            None,
        );

        let failure = h.service.handle("tester", &request()).await.unwrap_err();
        match failure.error {
            WebExtractError::Timeout { elapsed_ms } => assert!(elapsed_ms >= 30_000),
            other => panic!("expected timeout, got {other:?}"),
        }
        settle(&h.index).await;
        assert!(h.index.is_empty().await);
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_the_loader() {
        let h = harness(
            FakeModel {
                delay: Duration::ZERO,
                fail: false,
            },
            None,
        );
        let bad = ContextRequest::new("tpl", "http://localhost/admin", vec![]);

        let failure = h.service.handle("tester", &bad).await.unwrap_err();
        assert_eq!(failure.error.code(), "VALIDATION_ERROR");
        assert_eq!(h.loader.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rate_limited_callers_are_rejected() {
        let h = harness(
            FakeModel {
                delay: Duration::ZERO,
                fail: false,
            },
            Some(FixedWindowLimiter::new(1, Duration::from_secs(60))),
        );

        h.service.handle("caller-a", &request()).await.expect("first");
        let failure = h.service.handle("caller-a", &request()).await.unwrap_err();
        assert_eq!(failure.error.code(), "TOO_MANY_REQUESTS");
        h.service.handle("caller-b", &request()).await.expect("other caller");
    }
}
