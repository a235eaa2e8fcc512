
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{Embedder, check_dimension};
use crate::config::Config;
use crate::providers::{ApiClient, ProviderError};

const PROVIDER: &str = "Ollama";
const PERMISSION_HELP: &str =
    "The Ollama server rejected the request. Check OLLAMA_HOST and any proxy in front of it.";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    dimension: Option<usize>,
    client: ApiClient,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        Ok(Self {
            base_url,
            model: config.embeddings.ollama.model.clone(),
            batch_size: config.embeddings.ollama.batch_size.max(1),
            dimension: Some(config.embeddings.active_dimension()),
            client: ApiClient::new(
                PROVIDER,
                Duration::from_secs(config.embeddings.timeout_seconds),
            )
            .with_permission_help(PERMISSION_HELP),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.client = self.client.with_retry_attempts(attempts);
        self
    }

    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.client = self.client.with_backoff_unit(unit);
        self
    }

    /// Test connection to Ollama server and verify model availability
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().context("Server ping failed")?;
        self.validate_model(&models)
            .context("Model validation failed")?;

        info!(
            "Health check passed for Ollama server at {} with model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let models_response: ModelsResponse = self
            .client
            .get_json(url.as_str(), &[])
            .context("Failed to fetch models")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    fn validate_model(&self, models: &[ModelInfo]) -> Result<()> {
        // `nomic-embed-text` and `nomic-embed-text:latest` name the same model
        let wanted = self.model.strip_suffix(":latest").unwrap_or(&self.model);
        let available = models
            .iter()
            .any(|m| m.name.strip_suffix(":latest").unwrap_or(&m.name) == wanted);

        if available {
            debug!("Model {} is available", self.model);
            Ok(())
        } else {
            let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available_models
            );
            Err(anyhow::anyhow!(
                "Model '{}' is not available. Available models: {:?}",
                self.model,
                available_models
            ))
        }
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let url = format!("{}api/embed", self.base_url);
        let request = BatchEmbedRequest {
            model: &self.model,
            inputs: texts,
        };

        let response: BatchEmbedResponse = self.client.post_json(&url, &[], &request)?;

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
            .map(|embedding| check_dimension(PROVIDER, self.dimension, embedding))
            .collect()
    }
}

impl Embedder for OllamaClient {
    #[inline]
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[inline]
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        debug!("Generating embedding for text (length: {})", text.len());

        self.embed_single_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| ProviderError::invalid_response(PROVIDER, "no embedding returned"))
    }

    /// Process in batches to avoid overwhelming the server
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size as usize) {
            results.extend(self.embed_single_batch(chunk)?);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }
}
