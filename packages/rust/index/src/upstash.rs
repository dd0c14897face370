//! Upstash Vector REST backend.
//!
//! Vectors are computed client-side by an [`Embedder`] and upserted with the
//! chunk text and provenance in their metadata.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, instrument};

use webextract_shared::{DocumentMetadata, Result, VectorDocument, WebExtractError};

use crate::VectorIndex;
use crate::embeddings::Embedder;

const USER_AGENT: &str = concat!("webextract/", env!("CARGO_PKG_VERSION"));
const READINESS_POLL: Duration = Duration::from_millis(100);

/// Metadata layout stored alongside each vector.
#[derive(Debug, Serialize, Deserialize)]
struct StoredMetadata {
    source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_id: Option<String>,
    page_content: String,
}

#[derive(Serialize)]
struct UpsertEntry<'a> {
    id: &'a str,
    vector: Vec<f32>,
    metadata: StoredMetadata,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    vector: Vec<f32>,
    top_k: usize,
    include_metadata: bool,
    filter: String,
}

#[derive(Deserialize)]
struct QueryHit {
    id: String,
    #[serde(default)]
    metadata: Option<StoredMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexInfo {
    #[serde(default)]
    pending_vector_count: u64,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

/// Client for an Upstash Vector index.
pub struct UpstashVectorIndex {
    client: Client,
    base_url: String,
    token: String,
    embedder: Arc<dyn Embedder>,
}

impl UpstashVectorIndex {
    pub fn new(base_url: &str, token: String, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WebExtractError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            embedder,
        })
    }

    async fn call<B, T>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> std::result::Result<T, String>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .client
            .request(method, format!("{}/{endpoint}", self.base_url))
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("{endpoint}: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{endpoint}: HTTP {status}: {body}"));
        }

        response
            .json::<Envelope<T>>()
            .await
            .map(|envelope| envelope.result)
            .map_err(|e| format!("{endpoint}: unexpected response: {e}"))
    }
}

/// Upstash filter expression matching one `source` value.
fn source_filter(source: &str) -> String {
    format!("source = '{}'", source.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[async_trait]
impl VectorIndex for UpstashVectorIndex {
    #[instrument(skip_all, fields(documents = documents.len()))]
    async fn add_documents(&self, documents: &[VectorDocument]) -> Result<Vec<String>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != documents.len() {
            return Err(WebExtractError::Embedding(format!(
                "embedder returned {} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }

        let entries: Vec<UpsertEntry<'_>> = documents
            .iter()
            .zip(vectors)
            .map(|(doc, vector)| UpsertEntry {
                id: &doc.id,
                vector,
                metadata: StoredMetadata {
                    source: doc.metadata.source.clone(),
                    group_id: doc.metadata.group_id.clone(),
                    page_content: doc.page_content.clone(),
                },
            })
            .collect();

        self.call::<_, serde_json::Value>(Method::POST, "upsert", Some(&entries))
            .await
            .map_err(WebExtractError::Embedding)?;

        debug!("upserted documents");
        Ok(documents.iter().map(|d| d.id.clone()).collect())
    }

    #[instrument(skip_all, fields(k = k, source = %source))]
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        source: &str,
    ) -> Result<Vec<VectorDocument>> {
        let vector = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| WebExtractError::Retrieval(e.to_string()))?;

        let request = QueryRequest {
            vector,
            top_k: k,
            include_metadata: true,
            filter: source_filter(source),
        };
        let hits: Vec<QueryHit> = self
            .call(Method::POST, "query", Some(&request))
            .await
            .map_err(WebExtractError::Retrieval)?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let meta = hit.metadata?;
                Some(VectorDocument {
                    id: hit.id,
                    page_content: meta.page_content,
                    metadata: DocumentMetadata {
                        source: meta.source,
                        group_id: meta.group_id,
                    },
                })
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.call::<_, serde_json::Value>(Method::DELETE, "delete", Some(ids))
            .await
            .map(|_| ())
            .map_err(WebExtractError::Storage)
    }

    async fn delete_all(&self) -> Result<()> {
        self.call::<(), serde_json::Value>(Method::DELETE, "reset", None)
            .await
            .map(|_| ())
            .map_err(WebExtractError::Storage)
    }

    /// Poll the index until no vectors are pending, bounded by `budget`.
    async fn wait_until_searchable(&self, budget: Duration) -> Result<()> {
        let deadline = Instant::now() + budget;
        while Instant::now() < deadline {
            match self.call::<(), IndexInfo>(Method::GET, "info", None).await {
                Ok(info) if info.pending_vector_count == 0 => return Ok(()),
                Ok(info) => debug!(pending = info.pending_vector_count, "index still ingesting"),
                Err(e) => debug!(error = %e, "index info unavailable"),
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(READINESS_POLL.min(remaining)).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn index(server: &MockServer) -> UpstashVectorIndex {
        UpstashVectorIndex::new(
            &server.uri(),
            "vec-token".into(),
            Arc::new(HashingEmbedder::new(4)),
        )
        .expect("index")
    }

    fn document(id: &str) -> VectorDocument {
        VectorDocument {
            id: id.into(),
            page_content: "Some chunk".into(),
            metadata: DocumentMetadata {
                source: "https://example.com".into(),
                group_id: Some("group2".into()),
            },
        }
    }

    #[test]
    fn filter_escapes_quotes() {
        assert_eq!(source_filter("https://e.com"), "source = 'https://e.com'");
        assert_eq!(source_filter("https://e.com/it's"), r"source = 'https://e.com/it\'s'");
    }

    #[tokio::test]
    async fn upsert_sends_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upsert"))
            .and(header("authorization", "Bearer vec-token"))
            .and(body_partial_json(serde_json::json!([{
                "id": "doc-1",
                "metadata": {
                    "source": "https://example.com",
                    "group_id": "group2",
                    "page_content": "Some chunk"
                }
            }])))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "result": "Success" })))
            .expect(1)
            .mount(&server)
            .await;

        let ids = index(&server).add_documents(&[document("doc-1")]).await.expect("add");
        assert_eq!(ids, vec!["doc-1"]);
    }

    /// Drops the last vector of every batch.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![0.5; 4]; texts.len().saturating_sub(1)])
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.5; 4])
        }
    }

    #[tokio::test]
    async fn short_embedding_batch_is_rejected_before_upsert() {
        let server = MockServer::start().await;
        Mock::given(path("/upsert"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": "Success"})))
            .expect(0)
            .mount(&server)
            .await;
        let index =
            UpstashVectorIndex::new(&server.uri(), "vec-token".into(), Arc::new(ShortEmbedder))
                .expect("index");

        let err = index
            .add_documents(&[document("doc-1"), document("doc-2")])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EMBEDDING_FAILURE");
    }

    #[tokio::test]
    async fn query_filters_by_source() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(body_partial_json(serde_json::json!({
                "topK": 10,
                "includeMetadata": true,
                "filter": "source = 'https://example.com'"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": [
                    { "id": "a", "score": 0.9, "metadata": {
                        "source": "https://example.com", "page_content": "first" } },
                    { "id": "b", "score": 0.5 }
                ]
            })))
            .mount(&server)
            .await;

        let hits = index(&server)
            .similarity_search("price: the price", 10, "https://example.com")
            .await
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page_content, "first");
    }

    #[tokio::test]
    async fn query_failure_is_retrieval_error() {
        let server = MockServer::start().await;
        Mock::given(path("/query"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = index(&server)
            .similarity_search("q", 10, "s")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "RETRIEVAL_FAILURE");
    }

    #[tokio::test]
    async fn delete_and_reset() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/delete"))
            .and(body_json(serde_json::json!(["a", "b"])))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "result": { "deleted": 2 } })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/reset"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "result": "Success" })))
            .expect(1)
            .mount(&server)
            .await;

        let index = index(&server);
        index.delete(&["a".into(), "b".into()]).await.expect("delete");
        index.delete(&[]).await.expect("no-op delete");
        index.delete_all().await.expect("reset");
    }

    #[tokio::test]
    async fn readiness_polls_until_nothing_pending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": { "vectorCount": 3, "pendingVectorCount": 2 }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": { "vectorCount": 5, "pendingVectorCount": 0 }
            })))
            .mount(&server)
            .await;

        let started = std::time::Instant::now();
        index(&server)
            .wait_until_searchable(Duration::from_secs(5))
            .await
            .expect("ready");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
