//! LLM backend contract:
//! `POST <llm_url> {model, prompt, stream:false, options:{temperature, num_predict}} -> {response, model}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BackendError, Result};

/// Generation options sent on every call. Defaults match the spec: non-streaming,
/// limited output length, low temperature.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub num_predict: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "llama2".to_string(),
            temperature: 0.2,
            num_predict: 512,
        }
    }
}

/// Infrastructure trait for invoking the generation model.
#[async_trait]
pub trait BaseLlmBackend: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptionsWire,
}

#[derive(Debug, Serialize)]
struct GenerateOptionsWire {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    #[allow(dead_code)]
    model: Option<String>,
}

/// Real LLM backend reached over HTTP (Ollama-shaped wire contract).
pub struct HttpLlmBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpLlmBackend {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::from)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl BaseLlmBackend for HttpLlmBackend {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let request = GenerateRequest {
            model: &options.model,
            prompt,
            stream: false,
            options: GenerateOptionsWire {
                temperature: options.temperature,
                num_predict: options.num_predict,
            },
        };

        let response = self.client.post(&self.url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generate_returns_response_text() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "Paris is the capital of France.",
                "model": "llama2",
            })))
            .mount(&server)
            .await;

        let backend = HttpLlmBackend::new(server.uri(), Duration::from_secs(5)).unwrap();
        let text = backend
            .generate("What is the capital of France?", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "Paris is the capital of France.");
    }

    #[tokio::test]
    async fn generate_surfaces_backend_failure() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let backend = HttpLlmBackend::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = backend
            .generate("hello", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 500, .. }));
    }
}
