
use anyhow::{Context, Result};
use aws_smithy_eventstream::frame::{DecodedFrame, MessageFrameDecoder};
use aws_smithy_types::event_stream::Message;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::BytesMut;
use serde::Deserialize;
use std::io::BufRead;
use std::time::Duration;
use tracing::debug;

use super::{GenerationParams, Generator, MessagesRequest, MessagesStream};
use crate::config::Config;
use crate::providers::{
    ApiClient, BEDROCK_PERMISSION_HELP, ProviderError, body_chunks, bedrock_stream_url,
    error_message,
};

const PROVIDER: &str = "Bedrock";
const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Claude on Amazon Bedrock through `InvokeModelWithResponseStream`
#[derive(Debug, Clone)]
pub struct BedrockGenerator {
    stream_url: String,
    api_key: String,
    params: GenerationParams,
    client: ApiClient,
}

impl BedrockGenerator {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .secrets
            .bedrock_api_key
            .clone()
            .context("AWS_BEARER_TOKEN_BEDROCK is required for Bedrock generation")?;

        Ok(Self {
            stream_url: bedrock_stream_url(
                &config.bedrock.runtime_endpoint(),
                &config.generation.bedrock_model,
            ),
            api_key,
            params: GenerationParams::from(&config.generation),
            client: ApiClient::new(
                PROVIDER,
                Duration::from_secs(config.generation.timeout_seconds),
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

impl Generator for BedrockGenerator {
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
            anthropic_version: Some(ANTHROPIC_VERSION),
            ..MessagesRequest::user(prompt, self.params)
        };
        let authorization = format!("Bearer {}", self.api_key);
        let headers = [
            ("Authorization", authorization.as_str()),
            ("Accept", "application/vnd.amazon.eventstream"),
        ];

        let reader = self.client.post_stream(&self.stream_url, &headers, &request)?;
        let answer = read_response_stream(reader, on_token)?;

        if answer.is_empty() {
            return Err(ProviderError::invalid_response(
                PROVIDER,
                "response has no text content",
            ));
        }
        Ok(answer)
    }
}

/// Payload of a `chunk` event: a base64 encoded Messages API stream event
#[derive(Debug, Deserialize)]
struct ChunkPayload {
    bytes: String,
}

/// Decode the event-stream frames of a response stream, passing text deltas
/// to `on_token` as each frame completes
fn read_response_stream<R: BufRead>(
    reader: R,
    on_token: &mut dyn FnMut(&str),
) -> Result<String, ProviderError> {
    let mut decoder = MessageFrameDecoder::new();
    let mut buffer = BytesMut::new();
    let mut messages = MessagesStream::new(PROVIDER);

    for chunk in body_chunks(reader) {
        let chunk = chunk.map_err(|e| ProviderError::Transport {
            provider: PROVIDER,
            message: format!("stream interrupted: {}", e),
        })?;
        buffer.extend_from_slice(&chunk);

        loop {
            let frame = decoder.decode_frame(&mut buffer).map_err(|e| {
                ProviderError::invalid_response(PROVIDER, format!("bad stream frame: {}", e))
            })?;
            let DecodedFrame::Complete(message) = frame else {
                break;
            };
            if apply_message(&message, &mut messages, on_token)? {
                return Ok(messages.finish());
            }
        }
    }

    if !buffer.is_empty() {
        return Err(ProviderError::invalid_response(
            PROVIDER,
            format!("stream ended inside a frame ({} bytes left)", buffer.len()),
        ));
    }
    Ok(messages.finish())
}

/// Returns `true` once the model has finished its message
fn apply_message(
    message: &Message,
    messages: &mut MessagesStream,
    on_token: &mut dyn FnMut(&str),
) -> Result<bool, ProviderError> {
    match header(message, ":message-type") {
        Some("event") if header(message, ":event-type") == Some("chunk") => {
            let payload: ChunkPayload = serde_json::from_slice(message.payload()).map_err(|e| {
                ProviderError::invalid_response(PROVIDER, format!("bad chunk payload: {}", e))
            })?;
            let decoded = STANDARD.decode(payload.bytes).map_err(|e| {
                ProviderError::invalid_response(PROVIDER, format!("bad chunk encoding: {}", e))
            })?;
            let data = String::from_utf8(decoded).map_err(|e| {
                ProviderError::invalid_response(PROVIDER, format!("chunk is not UTF-8: {}", e))
            })?;
            messages.push(&data, on_token)
        }
        Some("exception") => {
            let kind = header(message, ":exception-type").unwrap_or("exception");
            let body = String::from_utf8_lossy(message.payload());
            Err(ProviderError::invalid_response(
                PROVIDER,
                format!("{}: {}", kind, error_message(&body)),
            ))
        }
        other => {
            debug!("Ignoring Bedrock stream message of type {:?}", other);
            Ok(false)
        }
    }
}

fn header<'a>(message: &'a Message, name: &str) -> Option<&'a str> {
    message
        .headers()
        .iter()
        .find(|h| h.name().as_str() == name)
        .and_then(|h| h.value().as_string().ok())
        .map(|value| value.as_str())
}
