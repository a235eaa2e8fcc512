
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;

pub const DEFAULT_OLLAMA_DIMENSION: u32 = 768;
pub const DEFAULT_TITAN_DIMENSION: usize = 1536;
pub const DEFAULT_GEMINI_DIMENSION: usize = 768;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the JSONL files, `<base_dir>/jsonl` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub scraper: ScraperConfig,
    pub chunking: ChunkingConfig,
    pub embeddings: EmbeddingsConfig,
    pub bedrock: BedrockConfig,
    pub generation: GenerationConfig,
    pub vector_store: VectorStoreConfig,
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
    #[serde(skip)]
    pub secrets: Secrets,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScraperConfig {
    pub sections: Vec<String>,
    /// Section pages live at `<section_base_url>/<section>`
    pub section_base_url: String,
    /// Base that relative article links are resolved against
    pub article_base_url: String,
    pub link_selector: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Politeness pause between article requests, picked uniformly from this range
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            sections: vec![
                "world".to_string(),
                "politics".to_string(),
                "business".to_string(),
            ],
            section_base_url: "https://www.cnn.com".to_string(),
            article_base_url: "http://cnn.com".to_string(),
            link_selector: r#"a[data-link-type="article"]"#.to_string(),
            user_agent: concat!("news-rag/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_seconds: 30,
            min_delay_ms: 100,
            max_delay_ms: 1000,
            max_retries: 2,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Ollama,
    Titan,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub provider: EmbeddingProvider,
    /// When set, every returned vector must have exactly this many values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_dimension: Option<usize>,
    pub timeout_seconds: u64,
    pub ollama: OllamaConfig,
    pub titan: TitanConfig,
    pub gemini: GeminiConfig,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            expected_dimension: None,
            timeout_seconds: 30,
            ollama: OllamaConfig::default(),
            titan: TitanConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_OLLAMA_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TitanConfig {
    pub model: String,
    pub dimension: usize,
}

impl Default for TitanConfig {
    fn default() -> Self {
        Self {
            model: "amazon.titan-embed-text-v1".to_string(),
            dimension: DEFAULT_TITAN_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
    pub dimension: usize,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            model: "text-embedding-004".to_string(),
            dimension: DEFAULT_GEMINI_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BedrockConfig {
    pub region: String,
    /// Overrides the regional runtime endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
        }
    }
}

impl BedrockConfig {
    #[inline]
    pub fn runtime_endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| {
            format!("https://bedrock-runtime.{}.amazonaws.com", self.region)
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    #[default]
    Bedrock,
    Anthropic,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: GenerationProvider,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_seconds: u64,
    pub bedrock_model: String,
    pub anthropic_endpoint: String,
    pub anthropic_model: String,
    pub ollama_model: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::default(),
            max_tokens: 1000,
            temperature: 0.0,
            top_p: 0.9,
            timeout_seconds: 120,
            bedrock_model: "anthropic.claude-3-haiku-20240307-v1:0".to_string(),
            anthropic_endpoint: "https://api.anthropic.com".to_string(),
            anthropic_model: "claude-3-5-haiku-latest".to_string(),
            ollama_model: "llama3.2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreBackend {
    #[default]
    Pinecone,
    Lancedb,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorStoreBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    /// Data-plane host; resolved through the control plane when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_host: Option<String>,
    pub control_plane_url: String,
    pub api_version: String,
    pub upsert_batch_size: usize,
    pub timeout_seconds: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorStoreBackend::default(),
            namespace: None,
            index_name: None,
            index_host: None,
            control_plane_url: "https://api.pinecone.io".to_string(),
            api_version: "2025-01".to_string(),
            upsert_batch_size: 100,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub max_context_chars: usize,
    pub separator: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            max_context_chars: 5000,
            separator: "\n".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub max_context_chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            max_context_chars: 1000,
            static_dir: None,
        }
    }
}

/// API keys, only ever read from the environment
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub pinecone_api_key: Option<String>,
    pub bedrock_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: Option<&String>) -> &'static str {
            if value.is_some() { "<set>" } else { "<unset>" }
        }

        f.debug_struct("Secrets")
            .field("pinecone_api_key", &redact(self.pinecone_api_key.as_ref()))
            .field("bedrock_api_key", &redact(self.bedrock_api_key.as_ref()))
            .field("gemini_api_key", &redact(self.gemini_api_key.as_ref()))
            .field("anthropic_api_key", &redact(self.anthropic_api_key.as_ref()))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("ENABLE_TITAN_EMBEDDINGS and ENABLE_GEMINI_EMBEDDINGS cannot both be enabled")]
    ConflictingEmbeddings,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid chunking settings: {0}")]
    InvalidChunking(String),
    #[error("No news sections configured")]
    NoSections,
    #[error("Invalid politeness delay: min {min}ms is greater than max {max}ms")]
    InvalidDelay { min: u64, max: u64 },
    #[error("Invalid link selector: {0}")]
    InvalidSelector(String),
    #[error("Invalid retrieval settings: {0}")]
    InvalidRetrieval(String),
    #[error("Invalid generation settings: {0}")]
    InvalidGeneration(String),
    #[error("Invalid bind address: {0}")]
    InvalidBind(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "titan" => Ok(Self::Titan),
            "gemini" => Ok(Self::Gemini),
            _ => Err(ConfigError::InvalidValue {
                name: "EMBEDDING_PROVIDER",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for GenerationProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bedrock" => Ok(Self::Bedrock),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                name: "GENERATION_PROVIDER",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for VectorStoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pinecone" => Ok(Self::Pinecone),
            "lancedb" => Ok(Self::Lancedb),
            _ => Err(ConfigError::InvalidValue {
                name: "VECTOR_STORE",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ollama => "ollama",
            Self::Titan => "titan",
            Self::Gemini => "gemini",
        })
    }
}

impl fmt::Display for GenerationProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bedrock => "bedrock",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        })
    }
}

impl fmt::Display for VectorStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pinecone => "pinecone",
            Self::Lancedb => "lancedb",
        })
    }
}

impl Config {
    /// Load `config.toml` from the directory, overlay the process environment and validate
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        Self::load_with_env(config_dir, |name| std::env::var(name).ok())
    }

    /// Same as [`Config::load`] with an explicit environment lookup
    #[inline]
    pub fn load_with_env<P, F>(config_dir: P, lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str::<Config>(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Config::default()
        };
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .apply_env(lookup)
            .context("Invalid environment configuration")?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Overlay environment variables onto the file configuration
    #[inline]
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("PINECONE_API_KEY") {
            self.secrets.pinecone_api_key = Some(key);
        }
        if let Some(name) = get("PINECONE_INDEX_NAME") {
            self.vector_store.index_name = Some(name);
        }
        if let Some(namespace) = get("PINECONE_NAMESPACE") {
            self.vector_store.namespace = Some(namespace);
        }
        if let Some(host) = get("PINECONE_INDEX_HOST") {
            self.vector_store.index_host = Some(host);
        }
        if let Some(backend) = get("VECTOR_STORE") {
            self.vector_store.backend = backend.parse()?;
        }

        // An explicit provider wins over the legacy enable flags
        if let Some(provider) = get("EMBEDDING_PROVIDER") {
            self.embeddings.provider = provider.parse()?;
        } else {
            let titan = get("ENABLE_TITAN_EMBEDDINGS").is_some_and(|v| is_truthy(&v));
            let gemini = get("ENABLE_GEMINI_EMBEDDINGS").is_some_and(|v| is_truthy(&v));
            match (titan, gemini) {
                (true, true) => return Err(ConfigError::ConflictingEmbeddings),
                (true, false) => self.embeddings.provider = EmbeddingProvider::Titan,
                (false, true) => self.embeddings.provider = EmbeddingProvider::Gemini,
                (false, false) => {}
            }
        }
        if let Some(provider) = get("GENERATION_PROVIDER") {
            self.generation.provider = provider.parse()?;
        }

        if let Some(region) = get("AWS_REGION") {
            self.bedrock.region = region;
        }
        if let Some(key) = get("AWS_BEARER_TOKEN_BEDROCK") {
            self.secrets.bedrock_api_key = Some(key);
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.secrets.gemini_api_key = Some(key);
        }
        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.secrets.anthropic_api_key = Some(key);
        }
        if let Some(host) = get("OLLAMA_HOST") {
            self.embeddings.ollama.set_url(&host)?;
        }
        if let Some(dir) = get("NEWS_RAG_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }

        Ok(())
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the default configuration directory path
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("news-rag"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scraper.validate()?;
        self.chunking
            .validate()
            .map_err(|e| ConfigError::InvalidChunking(e.to_string()))?;
        self.embeddings.validate()?;
        self.generation.validate()?;
        self.validate_retrieval()?;
        self.validate_vector_store()?;

        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBind(self.server.bind.clone()))?;

        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::InvalidRetrieval(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if self.retrieval.max_context_chars == 0 || self.server.max_context_chars == 0 {
            return Err(ConfigError::InvalidRetrieval(
                "max_context_chars must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_vector_store(&self) -> Result<(), ConfigError> {
        let store = &self.vector_store;
        if store.upsert_batch_size == 0 || store.upsert_batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(store.upsert_batch_size));
        }
        Url::parse(&store.control_plane_url)
            .map_err(|_| ConfigError::InvalidUrl(store.control_plane_url.clone()))?;
        Ok(())
    }

    /// Check the settings the selected embedder needs
    #[inline]
    pub fn require_embedder(&self) -> Result<(), ConfigError> {
        match self.embeddings.provider {
            EmbeddingProvider::Ollama => Ok(()),
            EmbeddingProvider::Titan => {
                require(&self.secrets.bedrock_api_key, "AWS_BEARER_TOKEN_BEDROCK")
            }
            EmbeddingProvider::Gemini => require(&self.secrets.gemini_api_key, "GEMINI_API_KEY"),
        }
    }

    /// Check the settings the selected vector store needs
    #[inline]
    pub fn require_vector_store(&self) -> Result<(), ConfigError> {
        require(&self.vector_store.namespace, "PINECONE_NAMESPACE")?;
        match self.vector_store.backend {
            VectorStoreBackend::Pinecone => {
                require(&self.secrets.pinecone_api_key, "PINECONE_API_KEY")?;
                require(&self.vector_store.index_name, "PINECONE_INDEX_NAME")
            }
            VectorStoreBackend::Lancedb => Ok(()),
        }
    }

    /// Check the settings the selected generator needs
    #[inline]
    pub fn require_generator(&self) -> Result<(), ConfigError> {
        match self.generation.provider {
            GenerationProvider::Bedrock => {
                require(&self.secrets.bedrock_api_key, "AWS_BEARER_TOKEN_BEDROCK")
            }
            GenerationProvider::Anthropic => {
                require(&self.secrets.anthropic_api_key, "ANTHROPIC_API_KEY")
            }
            GenerationProvider::Ollama => Ok(()),
        }
    }

    /// Namespace every vector store operation is scoped to
    #[inline]
    pub fn namespace(&self) -> Result<&str, ConfigError> {
        self.vector_store
            .namespace
            .as_deref()
            .ok_or(ConfigError::MissingEnv("PINECONE_NAMESPACE"))
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Directory the scraper writes JSONL files to and `upsert` reads from
    #[inline]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("jsonl"))
    }

    /// Get the path for the local vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.embeddings.ollama.ollama_url()
    }
}

impl ScraperConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sections.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigError::NoSections);
        }
        for url in [&self.section_base_url, &self.article_base_url] {
            Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
        }
        if self.link_selector.trim().is_empty() {
            return Err(ConfigError::InvalidSelector(self.link_selector.clone()));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::InvalidDelay {
                min: self.min_delay_ms,
                max: self.max_delay_ms,
            });
        }
        Ok(())
    }
}

impl EmbeddingsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;

        if self.titan.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.titan.model.clone()));
        }
        if self.gemini.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.gemini.model.clone()));
        }
        Url::parse(&self.gemini.endpoint)
            .map_err(|_| ConfigError::InvalidUrl(self.gemini.endpoint.clone()))?;

        for dimension in [Some(self.titan.dimension), Some(self.gemini.dimension), self.expected_dimension]
            .into_iter()
            .flatten()
        {
            if !(64..=4096).contains(&dimension) {
                return Err(ConfigError::InvalidEmbeddingDimension(dimension));
            }
        }

        Ok(())
    }

    /// Dimension the active provider is expected to return
    #[inline]
    pub fn active_dimension(&self) -> usize {
        self.expected_dimension.unwrap_or(match self.provider {
            EmbeddingProvider::Ollama => self.ollama.embedding_dimension as usize,
            EmbeddingProvider::Titan => self.titan.dimension,
            EmbeddingProvider::Gemini => self.gemini.dimension,
        })
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidGeneration(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidGeneration(format!(
                "temperature {} must be between 0 and 1",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ConfigError::InvalidGeneration(format!(
                "top_p {} must be between 0 and 1",
                self.top_p
            )));
        }
        for model in [
            &self.bedrock_model,
            &self.anthropic_model,
            &self.ollama_model,
        ] {
            if model.trim().is_empty() {
                return Err(ConfigError::InvalidModel(model.clone()));
            }
        }
        Ok(())
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size as usize));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension as usize,
            ));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    /// Point at an Ollama server given as `host:port` or a full URL
    pub fn set_url(&mut self, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let with_scheme = if value.contains("://") {
            value.to_string()
        } else {
            format!("http://{}", value)
        };
        let url =
            Url::parse(&with_scheme).map_err(|_| ConfigError::InvalidUrl(value.to_string()))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidUrl(value.to_string()))?;

        self.protocol = url.scheme().to_string();
        self.host = host.to_string();
        self.port = url.port().unwrap_or(11434);
        Ok(())
    }
}

fn require(value: &Option<String>, name: &'static str) -> Result<(), ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::MissingEnv(name)),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
