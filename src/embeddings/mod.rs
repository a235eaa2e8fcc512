// Embedding providers and text chunking

pub mod chunking;
pub mod gemini;
pub mod ollama;
pub mod titan;


use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, EmbeddingProvider};
use crate::providers::ProviderError;

pub use chunking::{ChunkingConfig, TextWindow, chunk_text, chunk_with_config};
pub use gemini::GeminiEmbedder;
pub use ollama::OllamaClient;
pub use titan::TitanEmbedder;

/// Turns text into a fixed-size vector
pub trait Embedder: Send + Sync {
    /// Short provider name used in logs and status output
    fn name(&self) -> &'static str;

    /// Number of values in every returned vector, when known up front
    fn dimension(&self) -> Option<usize>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed several texts, preserving order
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Build the embedder selected in the configuration
#[inline]
pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    config
        .require_embedder()
        .context("Embedding provider is not configured")?;

    let embedder: Arc<dyn Embedder> = match config.embeddings.provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaClient::new(config)?),
        EmbeddingProvider::Titan => Arc::new(TitanEmbedder::new(config)?),
        EmbeddingProvider::Gemini => Arc::new(GeminiEmbedder::new(config)?),
    };

    info!(
        "Using {} embeddings ({} dimensions)",
        embedder.name(),
        embedder
            .dimension()
            .map_or_else(|| "unknown".to_string(), |d| d.to_string())
    );

    Ok(embedder)
}

/// Reject vectors whose length differs from the expected dimension
pub(crate) fn check_dimension(
    provider: &'static str,
    expected: Option<usize>,
    vector: Vec<f32>,
) -> Result<Vec<f32>, ProviderError> {
    if vector.is_empty() {
        return Err(ProviderError::invalid_response(
            provider,
            "embedding is empty",
        ));
    }

    match expected {
        Some(expected) if expected != vector.len() => Err(ProviderError::DimensionMismatch {
            provider,
            expected,
            actual: vector.len(),
        }),
        _ => Ok(vector),
    }
}
