// Vector records, their JSONL file format and the vector index backends

pub mod jsonl;
pub mod lancedb;
pub mod pinecone;


use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::Result;
use crate::config::{Config, VectorStoreBackend};
use crate::crawler::{Chunk, Document};

pub use self::lancedb::LanceStore;
pub use self::pinecone::PineconeStore;

/// One embedded chunk, as written to JSONL and sent to the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// Metadata stored next to every vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorMetadata {
    /// Chunk text, returned as the passage on retrieval
    pub text: String,
    /// Date the article was scraped, `MM/DD/YYYY`
    pub scrape_date: String,
    pub section: String,
    /// Article URL
    pub source: String,
}

/// A nearest-neighbour match, higher score is more similar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VectorMetadata>,
}

impl VectorRecord {
    /// Pair a chunk with its embedding
    #[inline]
    pub fn from_chunk(document: &Document, chunk: &Chunk, section: &str, values: Vec<f32>) -> Self {
        Self {
            id: chunk.vector_id(),
            values,
            metadata: VectorMetadata {
                text: chunk.text.clone(),
                scrape_date: document.scrape_date(),
                section: section.to_string(),
                source: document.url.to_string(),
            },
        }
    }
}

/// Namespaced vector index
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name used in logs and status output
    fn name(&self) -> &'static str;

    /// Insert or replace records by id, returning how many were written
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<usize>;

    /// Up to `top_k` nearest records, ordered by descending score
    async fn query(&self, namespace: &str, vector: &[f32], top_k: usize)
    -> Result<Vec<ScoredMatch>>;

    /// Remove every record in the namespace
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;

    /// Number of records in the namespace
    async fn count(&self, namespace: &str) -> Result<u64>;
}

/// Connect to the vector store selected in the configuration
#[inline]
pub async fn build_vector_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    config
        .require_vector_store()
        .context("Vector store is not configured")?;

    let store: Arc<dyn VectorStore> = match config.vector_store.backend {
        VectorStoreBackend::Pinecone => Arc::new(
            PineconeStore::connect(config)
                .await
                .context("Failed to connect to Pinecone")?,
        ),
        VectorStoreBackend::Lancedb => Arc::new(
            LanceStore::open(&config.vector_database_path())
                .await
                .context("Failed to open LanceDB vector store")?,
        ),
    };

    info!("Using {} vector store", store.name());
    Ok(store)
}

/// Order matches by descending score and keep the best `top_k`
pub(crate) fn rank_matches(mut matches: Vec<ScoredMatch>, top_k: usize) -> Vec<ScoredMatch> {
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(top_k);
    matches
}
