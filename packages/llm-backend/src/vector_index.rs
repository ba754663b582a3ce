//! Vector index contract: `search(collection, query_vector, limit) -> [{payload:{text}}]`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BackendError, Result};

/// A single similarity-search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct Hit {
    pub payload: Payload,
    #[serde(default)]
    #[allow(dead_code)]
    pub score: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Payload {
    pub text: String,
}

/// Infrastructure trait for top-K similarity search against the document index.
#[async_trait]
pub trait BaseVectorIndex: Send + Sync {
    async fn search(&self, collection: &str, query_vector: &[f32], limit: usize)
        -> Result<Vec<Hit>>;
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
}

/// Real vector index reached over HTTP (Qdrant-shaped wire contract).
pub struct HttpVectorIndex {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVectorIndex {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::from)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl BaseVectorIndex for HttpVectorIndex {
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<Hit>> {
        let url = format!(
            "{}/collections/{}/search",
            self.base_url.trim_end_matches('/'),
            collection
        );
        let response = self
            .client
            .post(&url)
            .json(&SearchRequest {
                vector: query_vector,
                limit,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_parses_hits_preserving_order() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/collections/documents/search"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"payload": {"text": "first"}, "score": 0.9},
                {"payload": {"text": "second"}, "score": 0.5},
            ])))
            .mount(&server)
            .await;

        let index = HttpVectorIndex::new(server.uri(), Duration::from_secs(5)).unwrap();
        let hits = index.search("documents", &[0.1, 0.2], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload.text, "first");
        assert_eq!(hits[1].payload.text, "second");
    }

    #[tokio::test]
    async fn search_failure_surfaces_as_backend_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let index = HttpVectorIndex::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = index.search("documents", &[0.1], 5).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 503, .. }));
    }
}
