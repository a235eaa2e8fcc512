// LLM answer generation

pub mod anthropic;
pub mod bedrock;
pub mod ollama;


use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, GenerationConfig, GenerationProvider};
use crate::providers::ProviderError;

pub use anthropic::AnthropicGenerator;
pub use bedrock::BedrockGenerator;
pub use ollama::OllamaGenerator;

/// Produces an answer for a prompt, reporting text as it arrives
pub trait Generator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Generate a completion. `on_token` receives each piece of text in
    /// order; the return value is the full answer.
    fn generate(
        &self,
        prompt: &str,
        on_token: &mut dyn FnMut(&str),
    ) -> Result<String, ProviderError>;
}

/// Sampling parameters shared by every provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl From<&GenerationConfig> for GenerationParams {
    #[inline]
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

/// Build the generator selected in the configuration
#[inline]
pub fn build_generator(config: &Config) -> Result<Arc<dyn Generator>> {
    config
        .require_generator()
        .context("Generation provider is not configured")?;

    let generator: Arc<dyn Generator> = match config.generation.provider {
        GenerationProvider::Bedrock => Arc::new(BedrockGenerator::new(config)?),
        GenerationProvider::Anthropic => Arc::new(AnthropicGenerator::new(config)?),
        GenerationProvider::Ollama => Arc::new(OllamaGenerator::new(config)?),
    };

    info!("Using {} for answer generation", generator.name());
    Ok(generator)
}

/// Fill the question-answering template
#[inline]
pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "Human: Answer the following QUESTION based on the CONTEXT
given. If you do not know the answer and the CONTEXT doesn't
contain the answer truthfully say \"I don't know\".

QUESTION:
{}

CONTEXT:
{}

Assistant:
",
        query, context
    )
}

/// Messages API request body, shared by Anthropic and Claude on Bedrock
#[derive(Debug, Serialize)]
pub(crate) struct MessagesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_version: Option<&'a str>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub messages: [Message<'a>; 1],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct Message<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

impl<'a> MessagesRequest<'a> {
    pub(crate) fn user(prompt: &'a str, params: GenerationParams) -> Self {
        Self {
            model: None,
            anthropic_version: None,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
            stream: false,
        }
    }
}

/// Streamed Messages API event, as carried by Anthropic server-sent events
/// and by Bedrock response stream chunks
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: Delta },
    MessageStop,
    Error { error: StreamError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

/// Accumulates the answer from a sequence of streamed Messages API events
#[derive(Debug)]
pub(crate) struct MessagesStream {
    provider: &'static str,
    answer: String,
}

impl MessagesStream {
    pub(crate) fn new(provider: &'static str) -> Self {
        Self {
            provider,
            answer: String::new(),
        }
    }

    /// Apply one event payload. Returns `true` once the message is complete.
    pub(crate) fn push(
        &mut self,
        data: &str,
        on_token: &mut dyn FnMut(&str),
    ) -> Result<bool, ProviderError> {
        let event: StreamEvent = match serde_json::from_str(data.trim()) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping undecodable {} stream event: {}", self.provider, e);
                return Ok(false);
            }
        };

        match event {
            StreamEvent::ContentBlockDelta {
                delta: Delta::TextDelta { text },
            } => {
                on_token(&text);
                self.answer.push_str(&text);
                Ok(false)
            }
            StreamEvent::MessageStop => Ok(true),
            StreamEvent::Error { error } => Err(ProviderError::invalid_response(
                self.provider,
                format!("{}: {}", error.kind, error.message),
            )),
            StreamEvent::ContentBlockDelta { .. } | StreamEvent::Other => Ok(false),
        }
    }

    pub(crate) fn finish(self) -> String {
        debug!("{} streamed {} characters", self.provider, self.answer.len());
        self.answer
    }
}
