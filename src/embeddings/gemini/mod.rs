
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Embedder, check_dimension};
use crate::config::Config;
use crate::providers::{ApiClient, ProviderError};

const PROVIDER: &str = "Gemini";
const PERMISSION_HELP: &str = "Check that GEMINI_API_KEY is valid and that the Generative Language API is enabled for its project.
https://ai.google.dev/gemini-api/docs/api-key";
/// `batchEmbedContents` accepts at most this many requests
const MAX_BATCH: usize = 100;

/// Google Gemini text embeddings
#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    endpoint: String,
    model: String,
    api_key: String,
    dimension: usize,
    client: ApiClient,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<ContentEmbedding>,
}

impl GeminiEmbedder {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .secrets
            .gemini_api_key
            .clone()
            .context("GEMINI_API_KEY is required for Gemini embeddings")?;
        let gemini = &config.embeddings.gemini;

        Ok(Self {
            endpoint: gemini.endpoint.trim_end_matches('/').to_string(),
            model: format!("models/{}", gemini.model.trim_start_matches("models/")),
            api_key,
            dimension: config.embeddings.active_dimension(),
            client: ApiClient::new(
                PROVIDER,
                Duration::from_secs(config.embeddings.timeout_seconds),
            )
            .with_permission_help(PERMISSION_HELP),
        })
    }

    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.client = self.client.with_backoff_unit(unit);
        self
    }

    fn request<'a>(&'a self, text: &'a str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: &self.model,
            content: Content {
                parts: [Part { text }],
            },
            output_dimensionality: (self.dimension != crate::config::settings::DEFAULT_GEMINI_DIMENSION)
                .then_some(self.dimension),
        }
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let url = format!("{}/v1beta/{}:batchEmbedContents", self.endpoint, self.model);
        let request = BatchEmbedRequest {
            requests: texts.iter().map(|text| self.request(text)).collect(),
        };

        let response: BatchEmbedResponse =
            self.client
                .post_json(&url, &[("x-goog-api-key", self.api_key.as_str())], &request)?;

        if response.embeddings.len() != texts.len() {
            return Err(ProviderError::invalid_response(
                PROVIDER,
                format!(
                    "mismatch between request and response counts: {} vs {}",
                    texts.len(),
                    response.embeddings.len()
                ),
            ));
        }

        response
            .embeddings
            .into_iter()
            .map(|embedding| check_dimension(PROVIDER, Some(self.dimension), embedding.values))
            .collect()
    }
}

impl Embedder for GeminiEmbedder {
    #[inline]
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[inline]
    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/v1beta/{}:embedContent", self.endpoint, self.model);

        let response: EmbedContentResponse = self.client.post_json(
            &url,
            &[("x-goog-api-key", self.api_key.as_str())],
            &self.request(text),
        )?;

        debug!(
            "Gemini returned {} dimensions",
            response.embedding.values.len()
        );
        check_dimension(PROVIDER, Some(self.dimension), response.embedding.values)
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH) {
            results.extend(self.embed_chunk(chunk)?);
        }
        Ok(results)
    }
}
