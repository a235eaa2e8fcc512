
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{GenerationParams, Generator};
use crate::config::Config;
use crate::providers::{ApiClient, ProviderError};

const PROVIDER: &str = "Ollama";

/// Local model served by Ollama, streamed as newline-delimited JSON
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    base_url: Url,
    model: String,
    params: GenerationParams,
    client: ApiClient,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaGenerator {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        Ok(Self {
            base_url,
            model: config.generation.ollama_model.clone(),
            params: GenerationParams::from(&config.generation),
            client: ApiClient::new(
                PROVIDER,
                Duration::from_secs(config.generation.timeout_seconds),
            ),
        })
    }
}

impl Generator for OllamaGenerator {
    #[inline]
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[inline]
    fn generate(
        &self,
        prompt: &str,
        on_token: &mut dyn FnMut(&str),
    ) -> Result<String, ProviderError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
            options: GenerateOptions {
                temperature: self.params.temperature,
                top_p: self.params.top_p,
                num_predict: self.params.max_tokens,
            },
        };

        let url = format!("{}api/generate", self.base_url);
        let reader = self.client.post_stream(&url, &[], &request)?;
        read_ndjson_stream(reader, on_token)
    }
}

fn read_ndjson_stream<R: BufRead>(
    reader: R,
    on_token: &mut dyn FnMut(&str),
) -> Result<String, ProviderError> {
    let mut answer = String::new();

    for line in reader.lines() {
        let line = line.map_err(|e| ProviderError::Transport {
            provider: PROVIDER,
            message: format!("stream interrupted: {}", e),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let chunk: GenerateChunk = serde_json::from_str(&line).map_err(|e| {
            ProviderError::invalid_response(PROVIDER, format!("bad stream line: {}", e))
        })?;

        if let Some(error) = chunk.error {
            return Err(ProviderError::invalid_response(PROVIDER, error));
        }
        if !chunk.response.is_empty() {
            on_token(&chunk.response);
            answer.push_str(&chunk.response);
        }
        if chunk.done {
            break;
        }
    }

    debug!("Ollama streamed {} characters", answer.len());
    Ok(answer)
}
