//! Embedding backend contract: `POST <embed_url>/encode {text} -> {vector, dim}`.
//!
//! Treated as an out-of-process black box (§6 of the spec) — this client just
//! speaks its wire contract and normalizes whatever vector comes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BackendError, Result};

/// Infrastructure trait for turning text into a unit-normalized embedding.
///
/// Naming follows the teacher's `Base*` convention for swappable infra traits.
#[async_trait]
pub trait BaseEmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// The dimension this backend is configured to produce.
    fn dimension(&self) -> usize;
}

#[derive(Debug, Serialize)]
struct EncodeRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EncodeResponse {
    vector: Vec<f32>,
    #[serde(default)]
    #[allow(dead_code)]
    dim: Option<usize>,
}

/// Real embedding backend reached over HTTP.
pub struct HttpEmbeddingBackend {
    client: reqwest::Client,
    base_url: String,
    dim: usize,
}

impl HttpEmbeddingBackend {
    pub fn new(base_url: impl Into<String>, dim: usize, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::from)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            dim,
        })
    }
}

#[async_trait]
impl BaseEmbeddingBackend for HttpEmbeddingBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/encode", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&EncodeRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let parsed: EncodeResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        Ok(normalize(parsed.vector))
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// Scale a vector to unit L2 norm. A zero vector is returned unchanged.
pub fn normalize(v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v;
    }
    v.into_iter().map(|x| x / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vector() {
        let v = normalize(vec![3.0, 4.0]);
        let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_vector_is_unchanged() {
        let v = normalize(vec![0.0, 0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn embed_rejects_non_2xx() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/encode"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let backend =
            HttpEmbeddingBackend::new(server.uri(), 384, Duration::from_secs(5)).unwrap();
        let err = backend.embed("hello").await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn embed_normalizes_the_returned_vector() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/encode"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "vector": [3.0, 4.0],
                "dim": 2,
            })))
            .mount(&server)
            .await;

        let backend = HttpEmbeddingBackend::new(server.uri(), 2, Duration::from_secs(5)).unwrap();
        let v = backend.embed("hello").await.unwrap();
        let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }
}
