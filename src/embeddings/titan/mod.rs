
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Embedder, check_dimension};
use crate::config::Config;
use crate::providers::{ApiClient, BEDROCK_PERMISSION_HELP, ProviderError, bedrock_invoke_url};

const PROVIDER: &str = "Titan";

/// Amazon Titan text embeddings served by Bedrock
#[derive(Debug, Clone)]
pub struct TitanEmbedder {
    invoke_url: String,
    api_key: String,
    dimension: usize,
    client: ApiClient,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TitanRequest<'a> {
    input_text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitanResponse {
    embedding: Vec<f32>,
    #[serde(default)]
    input_text_token_count: Option<u32>,
}

impl TitanEmbedder {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .secrets
            .bedrock_api_key
            .clone()
            .context("AWS_BEARER_TOKEN_BEDROCK is required for Titan embeddings")?;

        Ok(Self {
            invoke_url: bedrock_invoke_url(
                &config.bedrock.runtime_endpoint(),
                &config.embeddings.titan.model,
            ),
            api_key,
            dimension: config.embeddings.active_dimension(),
            client: ApiClient::new(
                PROVIDER,
                Duration::from_secs(config.embeddings.timeout_seconds),
            )
            .with_permission_help(BEDROCK_PERMISSION_HELP),
        })
    }

    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.client = self.client.with_backoff_unit(unit);
        self
    }
}

impl Embedder for TitanEmbedder {
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
        let authorization = format!("Bearer {}", self.api_key);
        let headers = [
            ("Authorization", authorization.as_str()),
            ("Accept", "application/json"),
        ];

        let response: TitanResponse = self.client.post_json(
            &self.invoke_url,
            &headers,
            &TitanRequest { input_text: text },
        )?;

        debug!(
            "Titan embedded {} tokens into {} dimensions",
            response.input_text_token_count.unwrap_or_default(),
            response.embedding.len()
        );

        check_dimension(PROVIDER, Some(self.dimension), response.embedding)
    }
}
