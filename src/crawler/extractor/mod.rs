#[cfg(test)]
mod tests;

use chrono::NaiveDate;
use scraper::{Html, Selector};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::Result;
use crate::embeddings::chunking::{ChunkingConfig, chunk_with_config};

/// Why a single article could not be turned into a [`Document`]
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("failed to parse {url}: {message}")]
    Parse { url: String, message: String },

    #[error("no article body found in {url}")]
    MissingContent { url: String },
}

/// A scraped article
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Stable identifier derived from the URL with [`article_id`]
    pub source_id: String,
    pub url: Url,
    pub full_text: String,
    pub retrieved_at: NaiveDate,
}

/// A window of a document, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub parent_source_id: String,
    pub sequence_index: usize,
    pub char_start: usize,
    pub text: String,
}

impl Document {
    #[inline]
    pub fn new(url: Url, full_text: String, retrieved_at: NaiveDate) -> Self {
        Self {
            source_id: article_id(&url),
            url,
            full_text,
            retrieved_at,
        }
    }

    /// Scrape date in the `MM/DD/YYYY` form stored alongside each vector
    #[inline]
    pub fn scrape_date(&self) -> String {
        self.retrieved_at.format("%m/%d/%Y").to_string()
    }

    /// Split the document into windows tagged with this document's id
    #[inline]
    pub fn chunk(&self, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
        config.validate()?;

        Ok(chunk_with_config(&self.full_text, config)
            .into_iter()
            .map(|window| Chunk {
                parent_source_id: self.source_id.clone(),
                sequence_index: window.sequence_index,
                char_start: window.char_start,
                text: window.text,
            })
            .collect())
    }
}

impl Chunk {
    /// Composite vector store key, `doc-<source_id>#chunk<sequence_index>`
    #[inline]
    pub fn vector_id(&self) -> String {
        vector_id(&self.parent_source_id, self.sequence_index)
    }
}

#[inline]
pub fn vector_id(source_id: &str, sequence_index: usize) -> String {
    format!("doc-{}#chunk{}", source_id, sequence_index)
}

/// Derive a stable article id from its URL.
///
/// The path loses its leading slash and any trailing `index.html` page, and
/// the remaining segments are joined with `_`:
/// `http://cnn.com/2024/05/01/world/story/index.html` becomes
/// `2024_05_01_world_story`. URLs without a path fall back to the host.
#[inline]
pub fn article_id(url: &Url) -> String {
    let path = url.path().trim_start_matches('/');
    let path = path.strip_suffix("index.html").unwrap_or(path);
    let path = path.trim_end_matches('/');

    if path.is_empty() {
        url.host_str().unwrap_or_default().to_string()
    } else {
        path.replace('/', "_")
    }
}

/// Extract the `articleBody` of the first JSON-LD block that carries one
#[inline]
pub fn extract_article_body(html: &str, url: &Url) -> std::result::Result<String, FetchError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).map_err(|e| {
        FetchError::Parse {
            url: url.to_string(),
            message: format!("invalid JSON-LD selector: {:?}", e),
        }
    })?;

    let mut parse_error = None;
    let mut blocks = 0usize;
    let mut malformed = 0usize;

    for script in document.select(&selector) {
        blocks += 1;
        let raw = script.text().collect::<String>();
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) => {
                if let Some(body) = find_article_body(&value) {
                    debug!("Found article body ({} chars) in {}", body.len(), url);
                    return Ok(body.to_string());
                }
            }
            Err(e) => {
                debug!("Skipping malformed JSON-LD block in {}: {}", url, e);
                malformed += 1;
                parse_error.get_or_insert(e);
            }
        }
    }

    match parse_error {
        Some(e) if malformed == blocks => Err(FetchError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        }),
        _ => Err(FetchError::MissingContent {
            url: url.to_string(),
        }),
    }
}

fn find_article_body(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => {
            if let Some(body) = map.get("articleBody").and_then(Value::as_str) {
                return Some(body);
            }
            map.get("@graph").and_then(find_article_body)
        }
        Value::Array(items) => items.iter().find_map(find_article_body),
        _ => None,
    }
}
