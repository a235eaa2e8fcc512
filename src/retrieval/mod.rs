// Query-time retrieval: embed a question, find passages, build the prompt

pub mod context;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::{ScoredMatch, VectorStore};
use crate::embeddings::Embedder;
use crate::generation::{Generator, build_prompt};
use crate::{RagError, Result};

pub use context::pack_context;

/// A retrieved chunk of text, in similarity order
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub text: String,
    /// 0-based position in the similarity-ordered results
    pub rank: usize,
    /// Vector id of the match
    pub source_id: String,
    pub score: f32,
}

/// Everything sent to the generator for one question
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPrompt {
    pub passages: Vec<Passage>,
    pub context: String,
    pub prompt: String,
}

/// Turn ranked matches into passages. Matches without stored text are dropped
/// and the remaining passages are re-ranked densely.
#[inline]
pub fn passages_from_matches(matches: Vec<ScoredMatch>) -> Vec<Passage> {
    matches
        .into_iter()
        .filter_map(|m| {
            let text = m.metadata?.text;
            Some((m.id, m.score, text))
        })
        .enumerate()
        .map(|(rank, (source_id, score, text))| Passage {
            text,
            rank,
            source_id,
            score,
        })
        .collect()
}

/// Answers questions against one namespace of a vector store
#[derive(Clone)]
pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Option<Arc<dyn Generator>>,
    namespace: String,
    top_k: usize,
    separator: String,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("embedder", &self.embedder.name())
            .field("store", &self.store.name())
            .field("generator", &self.generator.as_ref().map(|g| g.name()))
            .field("namespace", &self.namespace)
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl QueryEngine {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, namespace: &str) -> Self {
        Self {
            embedder,
            store,
            generator: None,
            namespace: namespace.to_string(),
            top_k: 10,
            separator: "\n".to_string(),
        }
    }

    /// Engine using the retrieval settings and namespace from the configuration
    #[inline]
    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let namespace = config
            .namespace()
            .map_err(|e| RagError::Config(e.to_string()))?;

        Ok(Self::new(embedder, store, namespace)
            .with_top_k(config.retrieval.top_k)
            .with_separator(&config.retrieval.separator))
    }

    #[inline]
    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[inline]
    pub fn with_separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Embed a question with the configured embedder
    #[inline]
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidArgument("query must not be empty".to_string()));
        }

        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| RagError::Other(anyhow::anyhow!("Embedding task failed: {}", e)))??;

        debug!("Embedded query into {} dimensions", vector.len());
        Ok(vector)
    }

    /// Top-K matches for a question, most similar first
    #[inline]
    pub async fn search(&self, query: &str) -> Result<Vec<ScoredMatch>> {
        let vector = self.embed_query(query).await?;
        let matches = self
            .store
            .query(&self.namespace, &vector, self.top_k)
            .await?;

        info!(
            "Found {} matches in namespace {}",
            matches.len(),
            self.namespace
        );
        Ok(matches)
    }

    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Passage>> {
        Ok(passages_from_matches(self.search(query).await?))
    }

    /// Retrieve passages, pack them into at most `max_chars` characters and
    /// fill the prompt template
    #[inline]
    pub async fn prepare_prompt(&self, query: &str, max_chars: usize) -> Result<PreparedPrompt> {
        let passages = self.retrieve(query).await?;
        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        let context = pack_context(&texts, max_chars, &self.separator);
        let prompt = build_prompt(query.trim(), &context);

        debug!(
            "Packed {} of {} characters of context",
            context.chars().count(),
            max_chars
        );
        Ok(PreparedPrompt {
            passages,
            context,
            prompt,
        })
    }

    /// Full question answering. `on_token` receives the answer as it is
    /// generated; the complete answer is returned.
    #[inline]
    pub async fn answer<F>(&self, query: &str, max_chars: usize, mut on_token: F) -> Result<String>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let generator = self
            .generator
            .clone()
            .ok_or_else(|| RagError::Config("no generation provider configured".to_string()))?;

        let prepared = self.prepare_prompt(query, max_chars).await?;
        let prompt = prepared.prompt;

        let answer =
            tokio::task::spawn_blocking(move || generator.generate(&prompt, &mut on_token))
                .await
                .map_err(|e| RagError::Other(anyhow::anyhow!("Generation task failed: {}", e)))??;

        info!("Generated a {}-character answer", answer.chars().count());
        Ok(answer)
    }
}
