//! OpenAI-compatible `/embeddings` endpoint over blocking HTTP.

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{DEFAULT_DIMENSION, EmbeddingBackend, EmbeddingError, EmbeddingResult};
use crate::config::EmbeddingConfig;

pub struct OpenAiEmbeddings {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: Option<usize>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl OpenAiEmbeddings {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> EmbeddingResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Init(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
        })
    }

    /// Read the API key from the environment variable named in the config.
    pub fn from_config(config: &EmbeddingConfig) -> EmbeddingResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| EmbeddingError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(
            &config.endpoint,
            api_key,
            &config.model,
            config.dimensions,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

impl EmbeddingBackend for OpenAiEmbeddings {
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut body: EmbeddingResponse = response
            .json()
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        body.data.sort_by_key(|d| d.index);

        if body.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimensions.unwrap_or(DEFAULT_DIMENSION)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(url: &str) -> OpenAiEmbeddings {
        OpenAiEmbeddings::new(
            url,
            "test-key",
            "text-embedding-3-small",
            Some(3),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_embeddings_are_reordered_by_index() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":[
                    {"index":1,"embedding":[0.0,1.0,0.0]},
                    {"index":0,"embedding":[1.0,0.0,0.0]}
                ]}"#,
            )
            .create();

        let vectors = backend(&server.url()).embed_batch(&["a", "b"]).unwrap();
        mock.assert();
        assert_eq!(vectors[0], vec![1.0, 0.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_rate_limit_is_surfaced() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("POST", "/embeddings").with_status(429).create();

        let err = backend(&server.url()).embed_batch(&["a"]).unwrap_err();
        assert!(matches!(err, EmbeddingError::RateLimited));
    }

    #[test]
    fn test_count_mismatch_is_invalid_response() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_body(r#"{"data":[{"index":0,"embedding":[1.0,0.0,0.0]}]}"#)
            .create();

        let err = backend(&server.url()).embed_batch(&["a", "b"]).unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }
}
