// Shared HTTP plumbing for the hosted embedding, generation and vector index APIs


use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{BufRead, BufReader, ErrorKind};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};
use ureq::{Body, BodyReader};
use ureq::http::Response;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Remediation shown when Bedrock rejects a request for lack of access
pub const BEDROCK_PERMISSION_HELP: &str = "To troubleshoot this issue please refer to the following resources.
https://docs.aws.amazon.com/IAM/latest/UserGuide/troubleshoot_access-denied.html
https://docs.aws.amazon.com/bedrock/latest/userguide/security-iam.html";

/// Buffered reader over a streamed response body
pub type StreamReader = BufReader<BodyReader<'static>>;

/// Errors returned by external providers.
///
/// Authorization failures are kept apart from everything else so callers can
/// print remediation guidance instead of a raw HTTP error.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} denied access: {message}")]
    PermissionDenied {
        provider: &'static str,
        message: String,
        help: &'static str,
    },

    #[error("{provider} returned HTTP {status}: {message}")]
    Status {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} request failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} returned an unexpected response: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} returned a {actual}-dimension vector, expected {expected}")]
    DimensionMismatch {
        provider: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl ProviderError {
    #[inline]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Remediation text for authorization failures
    #[inline]
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::PermissionDenied { help, .. } => Some(help),
            _ => None,
        }
    }

    #[inline]
    pub fn invalid_response(provider: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider,
            message: message.into(),
        }
    }
}

/// Blocking JSON client with retry and error classification
#[derive(Debug, Clone)]
pub struct ApiClient {
    provider: &'static str,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff_unit: Duration,
    permission_help: &'static str,
}

impl ApiClient {
    #[inline]
    pub fn new(provider: &'static str, timeout: Duration) -> Self {
        Self {
            provider,
            agent: build_agent(timeout),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff_unit: Duration::from_secs(1),
            permission_help: "Check that the API key is valid and has access to the requested model or index.",
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    #[inline]
    pub fn with_permission_help(mut self, help: &'static str) -> Self {
        self.permission_help = help;
        self
    }

    #[inline]
    pub fn provider(&self) -> &'static str {
        self.provider
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// POST a JSON body and decode the JSON response
    #[inline]
    pub fn post_json<T, R>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &T,
    ) -> Result<R, ProviderError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut response = self.post(url, headers, body)?;
        self.decode(&mut response)
    }

    /// GET a URL and decode the JSON response
    #[inline]
    pub fn get_json<R>(&self, url: &str, headers: &[(&str, &str)]) -> Result<R, ProviderError>
    where
        R: DeserializeOwned,
    {
        let mut response = self.execute(url, || {
            let mut request = self.agent.get(url).header("Accept", "application/json");
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request.call()
        })?;
        self.decode(&mut response)
    }

    /// POST a JSON body and hand back the response body as a line reader
    #[inline]
    pub fn post_stream<T>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &T,
    ) -> Result<StreamReader, ProviderError>
    where
        T: Serialize + ?Sized,
    {
        let response = self.post(url, headers, body)?;
        Ok(BufReader::new(response.into_body().into_reader()))
    }

    fn post<T>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &T,
    ) -> Result<Response<Body>, ProviderError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_string(body).map_err(|e| ProviderError::Transport {
            provider: self.provider,
            message: format!("failed to serialize request: {}", e),
        })?;

        self.execute(url, || {
            let mut request = self
                .agent
                .post(url)
                .header("Content-Type", "application/json");
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request.send(&payload)
        })
    }

    fn decode<R>(&self, response: &mut Response<Body>) -> Result<R, ProviderError>
    where
        R: DeserializeOwned,
    {
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ProviderError::Transport {
                provider: self.provider,
                message: format!("failed to read response body: {}", e),
            })?;

        serde_json::from_str(&text).map_err(|e| {
            ProviderError::invalid_response(self.provider, format!("{}: {}", e, truncate(&text)))
        })
    }

    fn execute<F>(&self, url: &str, mut send: F) -> Result<Response<Body>, ProviderError>
    where
        F: FnMut() -> Result<Response<Body>, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!(
                "{} request to {} (attempt {}/{})",
                self.provider, url, attempt, self.retry_attempts
            );

            match send() {
                Ok(mut response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let code = status.as_u16();
                    let body = response.body_mut().read_to_string().unwrap_or_default();
                    let message = error_message(&body);

                    if code == 401 || code == 403 {
                        warn!("{} rejected credentials (HTTP {})", self.provider, code);
                        return Err(ProviderError::PermissionDenied {
                            provider: self.provider,
                            message,
                            help: self.permission_help,
                        });
                    }

                    let error = ProviderError::Status {
                        provider: self.provider,
                        status: code,
                        message,
                    };

                    if code >= 500 || code == 429 {
                        warn!(
                            "{} server error (status {}), attempt {}/{}",
                            self.provider, code, attempt, self.retry_attempts
                        );
                        last_error = Some(error);
                    } else {
                        warn!("{} client error (status {}), not retrying", self.provider, code);
                        return Err(error);
                    }
                }
                Err(
                    error @ (ureq::Error::ConnectionFailed
                    | ureq::Error::HostNotFound
                    | ureq::Error::Timeout(_)
                    | ureq::Error::Io(_)),
                ) => {
                    warn!(
                        "{} transport error: {}, attempt {}/{}",
                        self.provider, error, attempt, self.retry_attempts
                    );
                    last_error = Some(ProviderError::Transport {
                        provider: self.provider,
                        message: error.to_string(),
                    });
                }
                Err(error) => {
                    warn!("{} non-retryable error: {}", self.provider, error);
                    return Err(ProviderError::Transport {
                        provider: self.provider,
                        message: error.to_string(),
                    });
                }
            }

            if attempt < self.retry_attempts {
                let delay = self.backoff_unit * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                debug!("Waiting {:?} before retry", delay);
                std::thread::sleep(delay);
            }
        }

        error!("All retry attempts failed for {} request to {}", self.provider, url);

        Err(last_error.unwrap_or_else(|| ProviderError::Transport {
            provider: self.provider,
            message: "request failed after retries".to_string(),
        }))
    }
}

/// Bytes of a streamed body in the pieces they arrive in
#[inline]
pub fn body_chunks<R: BufRead>(mut reader: R) -> impl Iterator<Item = std::io::Result<Vec<u8>>> {
    std::iter::from_fn(move || {
        loop {
            let chunk = match reader.fill_buf() {
                Ok(buf) => buf.to_vec(),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e)),
            };
            if chunk.is_empty() {
                return None;
            }
            reader.consume(chunk.len());
            return Some(Ok(chunk));
        }
    })
}

/// Bedrock runtime `InvokeModelWithResponseStream` URL for a model id
#[inline]
pub fn bedrock_stream_url(endpoint: &str, model_id: &str) -> String {
    format!("{}-with-response-stream", bedrock_invoke_url(endpoint, model_id))
}

/// Bedrock runtime `InvokeModel` URL for a model id
#[inline]
pub fn bedrock_invoke_url(endpoint: &str, model_id: &str) -> String {
    format!(
        "{}/model/{}/invoke",
        endpoint.trim_end_matches('/'),
        model_id.replace(':', "%3A")
    )
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Pull a human readable message out of a provider error body
pub(crate) fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return truncate(body);
    };

    let candidates = [
        value.pointer("/error/message"),
        value.pointer("/message"),
        value.pointer("/Message"),
        value.pointer("/error"),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| truncate(body))
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_BODY_CHARS {
        text.trim().to_string()
    } else {
        let head: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{}...", head.trim_end())
    }
}
