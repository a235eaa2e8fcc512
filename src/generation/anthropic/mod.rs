
use anyhow::{Context, Result};
use eventsource_stream::Eventsource;
use futures::executor::block_on_stream;
use futures::stream;
use std::io::BufRead;
use std::time::Duration;

use super::{GenerationParams, Generator, MessagesRequest, MessagesStream};
use crate::config::Config;
use crate::providers::{ApiClient, ProviderError, body_chunks};

const PROVIDER: &str = "Anthropic";
const API_VERSION: &str = "2023-06-01";
const PERMISSION_HELP: &str = "Check that ANTHROPIC_API_KEY is valid and has access to the configured model.
https://docs.anthropic.com/en/api/errors";

/// Claude through the Anthropic Messages API with server-sent events
#[derive(Debug, Clone)]
pub struct AnthropicGenerator {
    endpoint: String,
    model: String,
    api_key: String,
    params: GenerationParams,
    client: ApiClient,
}

impl AnthropicGenerator {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .secrets
            .anthropic_api_key
            .clone()
            .context("ANTHROPIC_API_KEY is required for Anthropic generation")?;

        Ok(Self {
            endpoint: config
                .generation
                .anthropic_endpoint
                .trim_end_matches('/')
                .to_string(),
            model: config.generation.anthropic_model.clone(),
            api_key,
            params: GenerationParams::from(&config.generation),
            client: ApiClient::new(
                PROVIDER,
                Duration::from_secs(config.generation.timeout_seconds),
            )
            .with_permission_help(PERMISSION_HELP),
        })
    }

    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.client = self.client.with_backoff_unit(unit);
        self
    }
}

impl Generator for AnthropicGenerator {
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
        let request = MessagesRequest {
            model: Some(&self.model),
            stream: true,
            ..MessagesRequest::user(prompt, self.params)
        };
        let headers = [
            ("x-api-key", self.api_key.as_str()),
            ("anthropic-version", API_VERSION),
            ("Accept", "text/event-stream"),
        ];

        let url = format!("{}/v1/messages", self.endpoint);
        let reader = self.client.post_stream(&url, &headers, &request)?;
        read_event_stream(reader, on_token)
    }
}

/// Collect `text_delta` events from a Messages API event stream
fn read_event_stream<R: BufRead>(
    reader: R,
    on_token: &mut dyn FnMut(&str),
) -> Result<String, ProviderError> {
    let events = stream::iter(body_chunks(reader)).eventsource();
    let mut messages = MessagesStream::new(PROVIDER);

    for event in block_on_stream(Box::pin(events)) {
        let event = event.map_err(|e| ProviderError::Transport {
            provider: PROVIDER,
            message: format!("stream interrupted: {}", e),
        })?;

        if messages.push(&event.data, on_token)? {
            break;
        }
    }

    Ok(messages.finish())
}
