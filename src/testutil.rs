// In-memory stand-ins for the external services, shared by unit tests

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

use crate::crawler::{Document, DocumentFetcher, FetchError, SourceCollector};
use crate::database::{ScoredMatch, VectorRecord, VectorStore, rank_matches};
use crate::embeddings::Embedder;
use crate::generation::Generator;
use crate::providers::ProviderError;
use crate::{RagError, Result};

pub(crate) const DIMENSION: usize = 4;

/// Deterministic embedder: counts of vowels, consonants, digits and spaces
#[derive(Debug, Default)]
pub(crate) struct CountingEmbedder {
    /// Texts containing this marker fail with a server error
    pub fail_on: Option<&'static str>,
    pub deny: bool,
}

impl Embedder for CountingEmbedder {
    fn name(&self) -> &'static str {
        "Counting"
    }

    fn dimension(&self) -> Option<usize> {
        Some(DIMENSION)
    }

    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        if self.deny {
            return Err(ProviderError::PermissionDenied {
                provider: "Counting",
                message: "denied".to_string(),
                help: "grant access",
            });
        }
        if self.fail_on.is_some_and(|marker| text.contains(marker)) {
            return Err(ProviderError::Status {
                provider: "Counting",
                status: 500,
                message: "boom".to_string(),
            });
        }
        Ok(count_vector(text))
    }
}

pub(crate) fn count_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; DIMENSION];
    for c in text.chars() {
        let slot = if "aeiouAEIOU".contains(c) {
            0
        } else if c.is_alphabetic() {
            1
        } else if c.is_ascii_digit() {
            2
        } else {
            3
        };
        vector[slot] += 1.0;
    }
    vector
}

/// Namespaced store scoring by dot product
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    pub namespaces: Mutex<HashMap<String, Vec<VectorRecord>>>,
}

impl MemoryStore {
    pub(crate) fn records(&self, namespace: &str) -> Vec<VectorRecord> {
        self.namespaces
            .lock()
            .expect("store lock is not poisoned")
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn name(&self) -> &'static str {
        "Memory"
    }

    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<usize> {
        let mut namespaces = self.namespaces.lock().expect("store lock is not poisoned");
        let stored = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            stored.retain(|r| r.id != record.id);
            stored.push(record.clone());
        }
        Ok(records.len())
    }

    async fn query(&self, namespace: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredMatch>> {
        if vector.is_empty() {
            return Err(RagError::InvalidArgument("empty query vector".to_string()));
        }
        let matches = self
            .records(namespace)
            .into_iter()
            .map(|r| ScoredMatch {
                score: r.values.iter().zip(vector).map(|(a, b)| a * b).sum(),
                id: r.id,
                metadata: Some(r.metadata),
            })
            .collect();
        Ok(rank_matches(matches, top_k))
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.namespaces
            .lock()
            .expect("store lock is not poisoned")
            .remove(namespace);
        Ok(())
    }

    async fn count(&self, namespace: &str) -> Result<u64> {
        Ok(self.records(namespace).len() as u64)
    }
}

/// Generator that streams a fixed answer word by word and records prompts
#[derive(Debug, Default)]
pub(crate) struct ScriptedGenerator {
    pub answer: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::default(),
        }
    }
}

impl Generator for ScriptedGenerator {
    fn name(&self) -> &'static str {
        "Scripted"
    }

    fn generate(
        &self,
        prompt: &str,
        on_token: &mut dyn FnMut(&str),
    ) -> std::result::Result<String, ProviderError> {
        self.prompts
            .lock()
            .expect("prompt lock is not poisoned")
            .push(prompt.to_string());
        for token in self.answer.split_inclusive(' ') {
            on_token(token);
        }
        Ok(self.answer.clone())
    }
}

/// News site with canned section listings and article bodies
#[derive(Debug, Default)]
pub(crate) struct FakeCrawler {
    pub sections: HashMap<String, Vec<Url>>,
    pub articles: HashMap<String, String>,
    pub fetched: Vec<Url>,
}

impl FakeCrawler {
    pub(crate) fn with_section(mut self, section: &str, articles: &[(&str, &str)]) -> Self {
        let mut urls = Vec::new();
        for (url, body) in articles {
            let url = Url::parse(url).expect("test url is valid");
            self.articles.insert(url.to_string(), (*body).to_string());
            urls.push(url);
        }
        self.sections.insert(section.to_string(), urls);
        self
    }

    pub(crate) fn scrape_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date")
    }
}

#[async_trait]
impl SourceCollector for FakeCrawler {
    async fn collect(&mut self, section: &str) -> anyhow::Result<Vec<Url>> {
        self.sections
            .get(section)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("section {} returned HTTP 404", section))
    }
}

#[async_trait]
impl DocumentFetcher for FakeCrawler {
    async fn fetch(&mut self, url: &Url) -> std::result::Result<Document, FetchError> {
        self.fetched.push(url.clone());
        match self.articles.get(url.as_str()) {
            Some(body) if !body.is_empty() => {
                Ok(Document::new(url.clone(), body.clone(), Self::scrape_day()))
            }
            Some(_) => Err(FetchError::MissingContent {
                url: url.to_string(),
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
