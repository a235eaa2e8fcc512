use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Malformed record at {}:{line}: {source}", path.display())]
    MalformedRecord {
        path: std::path::PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Provider(#[from] providers::ProviderError),

    #[error(transparent)]
    Fetch(#[from] crawler::extractor::FetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod crawler;
pub mod database;
pub mod embeddings;
pub mod generation;
pub mod indexer;
pub mod providers;
pub mod retrieval;
pub mod server;

#[cfg(test)]
pub(crate) mod testutil;
