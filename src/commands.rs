use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::config::{Config, EmbeddingProvider};
use crate::crawler::NewsCrawler;
use crate::database::build_vector_store;
use crate::embeddings::{OllamaClient, build_embedder};
use crate::generation::build_generator;
use crate::indexer::{Indexer, ScrapeStats, UpsertStats, preview_records, upsert_from_dir};
use crate::providers::ProviderError;
use crate::retrieval::QueryEngine;
use crate::server::{AppState, router};

/// Scrape the given sections (or the configured ones) into JSONL files
#[inline]
pub async fn scrape(config: &Config, sections: &[String]) -> Result<ScrapeStats> {
    let embedder = build_embedder(config)?;
    let crawler = NewsCrawler::new(&config.scraper).context("Failed to create crawler")?;
    let sections = if sections.is_empty() {
        config.scraper.sections.clone()
    } else {
        sections.to_vec()
    };

    let mut indexer = Indexer::new(crawler, embedder, config.chunking, config.data_dir());
    let stats = indexer.scrape(&sections).await?;

    println!("{}", style("Scrape completed").green().bold());
    println!("  Sections: {} ({} failed)", stats.sections, stats.failed_sections);
    println!("  Articles discovered: {}", stats.discovered);
    println!("  Articles scraped: {}", stats.scraped);
    println!("  Articles failed: {}", stats.failed);
    println!("  Chunks written: {}", stats.chunks);
    println!("  Output: {}", config.data_dir().display());
    println!("  Duration: {:?}", stats.duration);
    Ok(stats)
}

/// Load every JSONL file in the data directory into the vector store
#[inline]
pub async fn upsert(config: &Config) -> Result<UpsertStats> {
    let store = build_vector_store(config).await?;
    let namespace = config.namespace()?;
    let data_dir = config.data_dir();

    let stats = upsert_from_dir(
        store.as_ref(),
        namespace,
        &data_dir,
        config.vector_store.upsert_batch_size,
    )
    .await?;

    println!(
        "Upserted {} records from {} files into namespace {}",
        style(stats.records).green(),
        stats.files,
        style(namespace).cyan()
    );
    Ok(stats)
}

/// Delete every vector in the configured namespace. Returns whether anything
/// was deleted.
#[inline]
pub async fn delete(config: &Config, skip_confirmation: bool) -> Result<bool> {
    let store = build_vector_store(config).await?;
    let namespace = config.namespace()?;

    if !skip_confirmation {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete all vectors in namespace '{}' from {}? This cannot be undone",
                namespace,
                store.name()
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("Cancelled");
            return Ok(false);
        }
    }

    store.delete_namespace(namespace).await?;
    println!("✓ Deleted all vectors in namespace {}", style(namespace).cyan());
    Ok(true)
}

/// Show the first records of every JSONL file in the data directory
#[inline]
pub fn print_records(config: &Config, limit: usize) -> Result<()> {
    let data_dir = config.data_dir();
    let previews = preview_records(&data_dir, limit)?;

    if previews.is_empty() {
        println!("No JSONL files in {}", data_dir.display());
        println!("Use 'news-rag scrape' to create them.");
        return Ok(());
    }

    for (path, records) in previews {
        println!("{}", style(path.display()).bold());
        for record in records {
            let values = record
                .values
                .iter()
                .map(f32::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            println!("  {}", style(&record.id).cyan());
            println!("  values: [{}]", values);
            println!(
                "  metadata: {}",
                serde_json::to_string_pretty(&record.metadata)?
            );
            println!();
        }
    }
    Ok(())
}

/// Print a query and its embedding
#[inline]
pub async fn embed(config: &Config, query: &str) -> Result<()> {
    let embedder = build_embedder(config)?;
    let owned = query.to_string();
    let vector = tokio::task::spawn_blocking(move || embedder.embed(&owned))
        .await
        .context("Embedding task panicked")??;

    println!("Query: {}", query);
    println!("Dimensions: {}", vector.len());
    println!("{:?}", vector);
    Ok(())
}

/// Print the nearest matches for a query
#[inline]
pub async fn search(config: &Config, query: &str) -> Result<()> {
    let engine = query_engine(config, false).await?;
    let matches = engine.search(query).await?;

    if matches.is_empty() {
        println!("No matches in namespace {}", engine.namespace());
        return Ok(());
    }

    for (rank, m) in matches.iter().enumerate() {
        let source = m.metadata.as_ref().map_or("", |meta| meta.source.as_str());
        println!(
            "{:>2}. {} {} {}",
            rank + 1,
            style(format!("{:.4}", m.score)).green(),
            style(&m.id).cyan(),
            style(source).dim()
        );
    }
    Ok(())
}

/// Print the packed context and the prompt that would be sent to the model
#[inline]
pub async fn prompt(config: &Config, query: &str) -> Result<()> {
    let engine = query_engine(config, false).await?;
    let prepared = engine
        .prepare_prompt(query, config.retrieval.max_context_chars)
        .await?;

    println!("{}", style("Retrieved passages:").bold().yellow());
    for passage in &prepared.passages {
        println!(
            "  #{} {} ({:.4})",
            passage.rank,
            style(&passage.source_id).cyan(),
            passage.score
        );
    }
    println!();
    println!("{}", style("Selected sections:").bold().yellow());
    println!("{}", prepared.context);
    println!();
    println!("{}", style("Prompt:").bold().yellow());
    println!("{}", prepared.prompt);
    Ok(())
}

/// Answer a question, printing tokens as they arrive
#[inline]
pub async fn invoke(config: &Config, query: &str) -> Result<String> {
    let engine = query_engine(config, true).await?;
    let answer = engine
        .answer(query, config.retrieval.max_context_chars, |token| {
            let mut stdout = std::io::stdout().lock();
            // Nothing useful to do if the terminal went away
            let _ = stdout.write_all(token.as_bytes());
            let _ = stdout.flush();
        })
        .await?;

    println!();
    Ok(answer)
}

/// Run the HTTP question endpoint until Ctrl-C
#[inline]
pub async fn serve(config: &Config, bind: Option<String>, static_dir: Option<PathBuf>) -> Result<()> {
    let engine = query_engine(config, true).await?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let static_dir = static_dir.or_else(|| config.server.static_dir.clone());

    if let Some(dir) = &static_dir {
        if !dir.is_dir() {
            anyhow::bail!("Static directory {} does not exist", dir.display());
        }
        info!("Serving static files from {}", dir.display());
    }

    let app = router(
        AppState {
            engine,
            max_context_chars: config.server.max_context_chars,
        },
        static_dir.as_deref(),
    );
    crate::server::serve(&bind, app).await
}

/// Report provider connectivity and the vector count of the namespace
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("{}", style("News RAG Status").bold().cyan());
    println!("{}", "=".repeat(40));

    println!("Embeddings: {}", style(config.embeddings.provider).cyan());
    if config.embeddings.provider == EmbeddingProvider::Ollama {
        match OllamaClient::new(config).and_then(|client| client.health_check()) {
            Ok(()) => println!(
                "  {} Ollama: Connected ({})",
                style("✓").green(),
                config.embeddings.ollama.model
            ),
            Err(e) => println!("  {} Ollama: {:#}", style("✗").red(), e),
        }
    } else if let Err(e) = config.require_embedder() {
        println!("  {} {}", style("✗").red(), e);
    } else {
        println!("  {} Credentials present", style("✓").green());
    }

    println!("Generation: {}", style(config.generation.provider).cyan());
    match config.require_generator() {
        Ok(()) => println!("  {} Credentials present", style("✓").green()),
        Err(e) => println!("  {} {}", style("✗").red(), e),
    }

    println!("Vector store: {}", style(config.vector_store.backend).cyan());
    match build_vector_store(config).await {
        Ok(store) => {
            let namespace = config.namespace()?;
            match store.count(namespace).await {
                Ok(count) => println!(
                    "  {} Namespace {}: {} vectors",
                    style("✓").green(),
                    style(namespace).cyan(),
                    count
                ),
                Err(e) => println!("  {} Failed to count vectors: {}", style("✗").red(), e),
            }
        }
        Err(e) => println!("  {} {:#}", style("✗").red(), e),
    }

    let data_dir = config.data_dir();
    println!("Data directory: {}", data_dir.display());
    match crate::database::jsonl::list_jsonl_files(&data_dir) {
        Ok(files) => println!("  {} JSONL files", files.len()),
        Err(_) => println!("  {}", style("not created yet").dim()),
    }
    Ok(())
}

/// Print an error, with remediation steps in red for authorization failures
#[inline]
pub fn report_error(error: &anyhow::Error) {
    let provider_error = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ProviderError>())
        .or_else(|| {
            error.chain().find_map(|cause| match cause.downcast_ref::<crate::RagError>() {
                Some(crate::RagError::Provider(e)) => Some(e),
                _ => None,
            })
        });

    match provider_error.and_then(ProviderError::remediation) {
        Some(help) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), error);
            eprintln!("{}", style(help).red());
        }
        None => eprintln!("{} {:#}", style("Error:").red().bold(), error),
    }
}

async fn query_engine(config: &Config, with_generator: bool) -> Result<QueryEngine> {
    // Fail on missing settings before connecting to anything
    config.require_embedder()?;
    config.require_vector_store()?;
    if with_generator {
        config.require_generator()?;
    }

    let embedder = build_embedder(config)?;
    let store = build_vector_store(config).await?;
    let engine = QueryEngine::from_config(config, embedder, store)?;
    if with_generator {
        Ok(engine.with_generator(build_generator(config)?))
    } else {
        Ok(engine)
    }
}
