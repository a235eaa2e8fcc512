// Configuration management module

pub mod settings;


use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};

pub use settings::{
    BedrockConfig, Config, ConfigError, EmbeddingProvider, EmbeddingsConfig, GeminiConfig,
    GenerationConfig, GenerationProvider, OllamaConfig, RetrievalConfig, ScraperConfig, Secrets,
    ServerConfig, TitanConfig, VectorStoreBackend, VectorStoreConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    Config::config_dir()
}

/// Write a default `config.toml` into the directory unless one already exists
#[inline]
pub fn init_config(config_dir: &Path, force: bool) -> Result<PathBuf> {
    let path = config_dir.join("config.toml");
    if path.exists() && !force {
        anyhow::bail!(
            "Configuration already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    let config = Config {
        base_dir: config_dir.to_path_buf(),
        ..Default::default()
    };
    config.save().context("Failed to save configuration")?;

    Ok(path)
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Scraper:").bold().yellow());
    eprintln!(
        "  Sections: {}",
        style(config.scraper.sections.join(", ")).cyan()
    );
    eprintln!(
        "  Section pages: {}",
        style(&config.scraper.section_base_url).cyan()
    );
    eprintln!(
        "  Delay: {}-{} ms",
        config.scraper.min_delay_ms, config.scraper.max_delay_ms
    );
    eprintln!(
        "  Chunking: window {}, overlap {}",
        config.chunking.window_size, config.chunking.overlap
    );
    eprintln!("  Data directory: {}", style(config.data_dir().display()).cyan());

    eprintln!();
    eprintln!("{}", style("Embeddings:").bold().yellow());
    eprintln!("  Provider: {}", style(config.embeddings.provider).cyan());
    eprintln!(
        "  Dimension: {}",
        style(config.embeddings.active_dimension()).cyan()
    );
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Generation:").bold().yellow());
    eprintln!("  Provider: {}", style(config.generation.provider).cyan());
    eprintln!(
        "  max_tokens {}, temperature {}, top_p {}",
        config.generation.max_tokens, config.generation.temperature, config.generation.top_p
    );
    eprintln!("  Bedrock region: {}", style(&config.bedrock.region).cyan());

    eprintln!();
    eprintln!("{}", style("Vector store:").bold().yellow());
    eprintln!("  Backend: {}", style(config.vector_store.backend).cyan());
    eprintln!(
        "  Index: {}",
        style(config.vector_store.index_name.as_deref().unwrap_or("<unset>")).cyan()
    );
    eprintln!(
        "  Namespace: {}",
        style(config.vector_store.namespace.as_deref().unwrap_or("<unset>")).cyan()
    );
    eprintln!(
        "  Retrieval: top_k {}, context {} chars (server {})",
        config.retrieval.top_k, config.retrieval.max_context_chars, config.server.max_context_chars
    );

    eprintln!();
    eprintln!("{}", style("Credentials:").bold().yellow());
    let secrets = [
        ("PINECONE_API_KEY", &config.secrets.pinecone_api_key),
        ("AWS_BEARER_TOKEN_BEDROCK", &config.secrets.bedrock_api_key),
        ("GEMINI_API_KEY", &config.secrets.gemini_api_key),
        ("ANTHROPIC_API_KEY", &config.secrets.anthropic_api_key),
    ];
    for (name, value) in secrets {
        let state = if value.is_some() {
            style("set").green()
        } else {
            style("unset").dim()
        };
        eprintln!("  {}: {}", name, state);
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}
